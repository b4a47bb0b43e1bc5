mod codec_tests;
mod common;
mod file_tests;
mod lock_tests;
mod store_tests;
