//! Builders to assemble the mail pipeline from configuration.

pub mod mailer_builder;

pub use mailer_builder::MailerBuilder;
