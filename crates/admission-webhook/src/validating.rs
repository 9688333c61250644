mod validator;
pub use validator::{Validator, ValidatorChain, ValidatorFn, ValidatorResult};
mod webhook;
pub use webhook::{ValidatingWebhook, WebhookConfig};
