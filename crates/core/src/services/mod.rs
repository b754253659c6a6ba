mod history;
mod ledger_sync;
mod window;

pub use history::*;
pub use ledger_sync::*;
pub use window::*;
