mod mutator;
pub use mutator::{Mutator, MutatorChain, MutatorFn, MutatorResult};
mod webhook;
pub use webhook::{MutatingWebhook, WebhookConfig};
