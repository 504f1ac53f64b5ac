pub mod approver;
pub mod attachment;
pub mod request;
