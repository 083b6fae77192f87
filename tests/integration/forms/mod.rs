pub mod form_flow_test;
pub mod storage_failure_test;
