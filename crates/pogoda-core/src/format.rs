//! Telegram Markdown rendering of weather data.

use crate::types::{DailyForecast, WeatherSnapshot};

/// Escape Telegram MarkdownV1 special characters.
pub fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

/// Current conditions block.
pub fn weather_details(snapshot: &WeatherSnapshot) -> String {
    format!(
        "{} *Погода:* {}\n\
         🌡️ *Температура:* {:.1}°C\n\
         🌡️ *Відчувається як:* {:.1}°C\n\
         💧 *Вологість:* {}%\n\
         💨 *Швидкість вітру:* {} м/с",
        snapshot.condition.emoji(),
        escape_markdown(&snapshot.description),
        snapshot.temperature_c,
        snapshot.feels_like_c,
        snapshot.humidity,
        snapshot.wind_speed,
    )
}

/// Multi-day forecast block.
pub fn forecast_details(days: &[DailyForecast]) -> String {
    let mut out = format!("🔮 *Прогноз погоди на {} днів:*\n", days.len());
    for day in days {
        out.push_str(&format!(
            "\n📅 *{}*:\n{} {}\n🌡️ Температура: {:.1}°C\n",
            day.date.format("%d.%m.%Y"),
            day.condition.emoji(),
            capitalize(&escape_markdown(&day.description)),
            day.temperature_c,
        ));
    }
    out.trim_end().to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
