mod integrity;
mod ledger;
mod movement;
mod period;
mod product;

pub use integrity::*;
pub use ledger::*;
pub use movement::*;
pub use period::*;
pub use product::*;
