pub mod agent;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod protocol;
pub mod providers;
pub mod taiga;
pub mod tools;
