//! # Pogoda Info
//! Static reference content served next to the weather: holidays and news links.

pub mod holidays;
pub mod news;

pub use holidays::{Holiday, holidays_for, today_text};
pub use news::{NEWS_SOURCES, NewsSource};
