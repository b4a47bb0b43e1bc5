mod common;
mod lock_tests;
mod store_tests;
mod ttl_tests;
