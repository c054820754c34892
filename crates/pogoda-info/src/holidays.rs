//! Ukrainian holidays and memorable dates.
//!
//! Fixed dates come from a static table; Easter, Trinity and Vyshyvanka Day
//! move every year. When a moving holiday lands on a fixed date it wins.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Serialize;

/// (month, day, name)
const STATIC_HOLIDAYS: &[(u32, u32, &str)] = &[
    (1, 1, "🎄 Новий рік"),
    (1, 6, "🌟 Святвечір"),
    (1, 7, "🎄 Різдво Христове (за юліанським календарем)"),
    (1, 14, "🎉 Старий Новий рік"),
    (1, 22, "🇺🇦 День Соборності України"),
    (1, 27, "🕯️ Міжнародний день пам'яті жертв Голокосту"),
    (2, 15, "🕯️ День вшанування учасників бойових дій на території інших держав"),
    (2, 20, "🕯️ День Героїв Небесної Сотні"),
    (3, 8, "🌷 Міжнародний жіночий день"),
    (3, 9, "📚 День народження Тараса Шевченка"),
    (3, 14, "🇺🇦 День українського добровольця"),
    (4, 26, "🕯️ День чорнобильської трагедії"),
    (5, 1, "🌱 День праці"),
    (5, 8, "🕯️ День пам'яті та примирення"),
    (5, 9, "🎖️ День перемоги над нацизмом у Другій світовій війні"),
    (5, 15, "👨‍👩‍👧‍👦 Міжнародний день сім'ї"),
    (6, 1, "👶 Міжнародний день захисту дітей"),
    (6, 28, "🇺🇦 День Конституції України"),
    (7, 28, "🇺🇦 День Української Державності"),
    (8, 24, "🇺🇦 День Незалежності України"),
    (9, 1, "🎓 День знань"),
    (9, 30, "📚 День бібліотек"),
    (10, 1, "🎵 Міжнародний день музики"),
    (10, 14, "🎖️ День захисників і захисниць України"),
    (11, 9, "📚 День української писемності та мови"),
    (11, 21, "🇺🇦 День Гідності та Свободи"),
    (11, 26, "🕯️ День пам'яті жертв голодоморів"),
    (12, 6, "🎖️ День Збройних Сил України"),
    (12, 19, "🎅 День Святого Миколая"),
    (12, 25, "🎄 Різдво Христове (за григоріанським календарем)"),
];

const EASTER: &str = "🐣 Великдень";
const TRINITY: &str = "🌿 Трійця";
const VYSHYVANKA: &str = "🌺 День вишиванки";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: &'static str,
}

/// Orthodox Easter (Meeus Julian algorithm), shifted to the Gregorian
/// calendar. The 13-day shift holds for 1900–2099.
pub fn orthodox_easter(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.rem_euclid(4);
    let c = year.rem_euclid(7);
    let d = (19 * a + 15) % 30;
    let e = (2 * b + 4 * c + 6 * d + 6) % 7;
    let f = (d + e) as u32;

    let julian = if f <= 9 {
        NaiveDate::from_ymd_opt(year, 3, f + 22)?
    } else {
        NaiveDate::from_ymd_opt(year, 4, f - 9)?
    };
    julian.checked_add_days(Days::new(13))
}

/// Trinity Sunday, 49 days after Easter.
pub fn trinity(year: i32) -> Option<NaiveDate> {
    orthodox_easter(year)?.checked_add_days(Days::new(49))
}

/// Vyshyvanka Day, the third Thursday of May.
pub fn vyshyvanka_day(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, 5, Weekday::Thu, 3)
}

/// Every holiday of `year`, in date order, one per day.
pub fn holidays_for(year: i32) -> Vec<Holiday> {
    let moving: Vec<Holiday> = [
        (orthodox_easter(year), EASTER),
        (vyshyvanka_day(year), VYSHYVANKA),
        (trinity(year), TRINITY),
    ]
    .into_iter()
    .filter_map(|(date, name)| date.map(|date| Holiday { date, name }))
    .collect();

    let mut all: Vec<Holiday> = STATIC_HOLIDAYS
        .iter()
        .filter_map(|&(month, day, name)| {
            NaiveDate::from_ymd_opt(year, month, day).map(|date| Holiday { date, name })
        })
        .filter(|h| !moving.iter().any(|m| m.date == h.date))
        .collect();
    all.extend(moving);
    all.sort_by_key(|h| h.date);
    all
}

pub fn holiday_on(date: NaiveDate) -> Option<Holiday> {
    holidays_for(date.year()).into_iter().find(|h| h.date == date)
}

/// Markdown line for the `holiday` command.
pub fn today_text(date: NaiveDate) -> String {
    match holiday_on(date) {
        Some(h) => format!("📅 *Сьогодні:* {}", h.name),
        None => "📅 *Сьогодні немає державних або релігійних свят.*".to_string(),
    }
}
