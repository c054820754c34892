//! Settlements of the Bilobozhnytska community and their coordinates.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
}

pub const SETTLEMENTS: &[Settlement] = &[
    Settlement { name: "Білобожниця", lat: 49.0261, lon: 25.7357 },
    Settlement { name: "Білий Потік", lat: 49.0767, lon: 25.6775 },
    Settlement { name: "Звиняч", lat: 49.0419, lon: 25.7619 },
    Settlement { name: "Семаківці", lat: 49.0461, lon: 25.6951 },
    Settlement { name: "Ромашівка", lat: 48.9974, lon: 25.7439 },
    Settlement { name: "Мазурівка", lat: 49.0114, lon: 25.6873 },
    Settlement { name: "Калинівщина", lat: 49.0008, lon: 25.7113 },
    Settlement { name: "Джурин", lat: 48.9711, lon: 25.7611 },
    Settlement { name: "Палашівка", lat: 48.9533, lon: 25.8004 },
    Settlement { name: "Косів", lat: 48.9325, lon: 25.7663 },
];

/// Look a settlement up by name, ignoring case and surrounding spaces.
pub fn find(name: &str) -> Option<&'static Settlement> {
    let wanted = name.trim().to_lowercase();
    SETTLEMENTS.iter().find(|s| s.name.to_lowercase() == wanted)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    SETTLEMENTS.iter().map(|s| s.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find() {
        let s = find("  білий потік ").unwrap();
        assert_eq!(s.name, "Білий Потік");
        assert!((s.lat - 49.0767).abs() < 1e-9);
        assert!(find("Київ").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let mut all: Vec<_> = names().collect();
        let count = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), count);
        assert_eq!(count, 10);
    }
}
