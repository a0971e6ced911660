pub mod domain;
pub mod error;
pub mod moderation;
pub mod protocol;
pub mod voice;
