pub mod files;
pub mod webhook;
