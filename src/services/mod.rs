pub mod conversation_service;
pub mod extraction_service;
pub mod intent_service;
pub mod ledger_service;
pub mod pipeline_service;
pub mod response_service;
pub mod vocabulary;
