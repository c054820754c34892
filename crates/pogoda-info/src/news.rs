//! Links to local news outlets.

use pogoda_core::error::{PogodaError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NewsSource {
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
}

pub const NEWS_SOURCES: &[NewsSource] = &[
    NewsSource {
        id: "suspilne",
        name: "Суспільне Тернопіль",
        url: "https://suspilne.media/ternopil/",
    },
    NewsSource {
        id: "chortkiv",
        name: "Чортків.City",
        url: "https://chortkiv.city/",
    },
];

pub fn source(id: &str) -> Result<&'static NewsSource> {
    let id = id.trim();
    NEWS_SOURCES
        .iter()
        .find(|s| s.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| PogodaError::NotFound(format!("news source '{id}'")))
}

/// Markdown list of every source.
pub fn sources_text() -> String {
    let mut out = String::from("*📰 Доступні новинні ресурси:*\n\n");
    for s in NEWS_SOURCES {
        out.push_str(&format!("*{}*\n[Перейти на сайт]({})\n\n", s.name, s.url));
    }
    out.trim_end().to_string()
}

/// Markdown link to one source.
pub fn link_text(source: &NewsSource) -> String {
    format!("*📰 {}*\n[Перейти на сайт]({})", source.name, source.url)
}
