pub mod automation;
pub mod chrome;
pub mod driver;
pub mod locate;

pub use automation::ChromePageDriver;
pub use driver::{BoundingBox, ElementState, PageDriver, Point, StorageState};
pub use locate::{click_last, click_target, locate, wait_for_target};
