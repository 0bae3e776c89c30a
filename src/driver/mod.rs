//! geckodriver process management and the WebDriver session handle.

pub mod launcher;
pub mod session;

pub use session::BrowserSession;
