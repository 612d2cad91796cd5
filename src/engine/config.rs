use std::collections::BTreeMap;
use std::time::Duration;

use super::collectible::CollectibleKind;
use crate::error::SetupError;

// Layout characters
pub const WALL_SIGN: char = '#';

// Property keys
pub const KEY_PLAYGROUND_FILE: &str = "playground.file";
pub const KEY_WORM_LENGTH: &str = "worm.length.start";
pub const KEY_MAX_INACTIVE_TURNS: &str = "worm.max.inactive.turns";
pub const KEY_MAX_TURNS: &str = "worm.max.turns";
pub const KEY_SURVIVAL_BONUS: &str = "worm.survival.bonus";
pub const KEY_TIMEOUT_SECONDS: &str = "worm.timeout.seconds";
pub const KEY_SEED: &str = "game.seed";
const COLLECTIBLE_PROBABILITY_PREFIX: &str = "collectible.probability.";
const COLLECTIBLE_PRICE_PREFIX: &str = "collectible.price.";
const COLLECTIBLE_EXPIRATION_PREFIX: &str = "collectible.expiration.";

// Defaults
pub const DEFAULT_WORM_LENGTH: usize = 1;
pub const DEFAULT_MAX_INACTIVE_TURNS: u32 = 3;
pub const DEFAULT_MAX_TURNS: u32 = 1000;
pub const DEFAULT_SURVIVAL_BONUS: i32 = 1;
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 1.0;
pub const DEFAULT_COLLECTIBLE_PROBABILITY: f64 = 0.1;
pub const DEFAULT_COLLECTIBLE_PRICE: i32 = 1;
pub const DEFAULT_COLLECTIBLE_EXPIRATION: u32 = 1;

/// Spawn parameters for one collectible kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectibleRule {
    /// Chance per turn that one collectible of this kind appears.
    pub probability: f64,
    pub points: i32,
    /// Turns until expiry; `None` never expires.
    pub expiration: Option<u32>,
}

impl Default for CollectibleRule {
    fn default() -> Self {
        Self {
            probability: DEFAULT_COLLECTIBLE_PROBABILITY,
            points: DEFAULT_COLLECTIBLE_PRICE,
            expiration: Some(DEFAULT_COLLECTIBLE_EXPIRATION),
        }
    }
}

/// Game rules, loaded from flat `key=value` properties.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub playground_file: Option<String>,
    pub worm_length: usize,
    pub max_inactive_turns: u32,
    pub max_turns: u32,
    pub survival_bonus: i32,
    pub decision_timeout: Duration,
    pub seed: Option<u64>,
    pub collectibles: BTreeMap<CollectibleKind, CollectibleRule>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            playground_file: None,
            worm_length: DEFAULT_WORM_LENGTH,
            max_inactive_turns: DEFAULT_MAX_INACTIVE_TURNS,
            max_turns: DEFAULT_MAX_TURNS,
            survival_bonus: DEFAULT_SURVIVAL_BONUS,
            decision_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECONDS),
            seed: None,
            collectibles: CollectibleKind::ALL
                .iter()
                .map(|k| (*k, CollectibleRule::default()))
                .collect(),
        }
    }
}

impl GameConfig {
    /// Parse properties text. Missing keys keep their defaults, unknown keys
    /// are ignored, unparsable values fail.
    pub fn parse(text: &str) -> Result<Self, SetupError> {
        Self::from_properties(&parse_properties(text))
    }

    pub fn from_properties(props: &[(String, String)]) -> Result<Self, SetupError> {
        let mut config = GameConfig::default();

        for (key, value) in props {
            match key.as_str() {
                KEY_PLAYGROUND_FILE => config.playground_file = Some(value.clone()),
                KEY_WORM_LENGTH => {
                    config.worm_length = parse_value(key, value)?;
                    if config.worm_length == 0 {
                        return Err(invalid(key, value, "must be at least 1"));
                    }
                }
                KEY_MAX_INACTIVE_TURNS => config.max_inactive_turns = parse_value(key, value)?,
                KEY_MAX_TURNS => config.max_turns = parse_value(key, value)?,
                KEY_SURVIVAL_BONUS => config.survival_bonus = parse_value(key, value)?,
                KEY_TIMEOUT_SECONDS => {
                    let secs: f64 = parse_value(key, value)?;
                    if !secs.is_finite() || secs <= 0.0 {
                        return Err(invalid(key, value, "must be a positive number of seconds"));
                    }
                    config.decision_timeout = Duration::try_from_secs_f64(secs)
                        .map_err(|e| invalid(key, value, &e.to_string()))?;
                }
                KEY_SEED => config.seed = Some(parse_value(key, value)?),
                _ => {
                    if !config.apply_collectible_key(key, value)? {
                        tracing::debug!(key = %key, "Ignoring unknown game setting");
                    }
                }
            }
        }

        Ok(config)
    }

    /// Returns false when `key` is not a collectible setting.
    fn apply_collectible_key(&mut self, key: &str, value: &str) -> Result<bool, SetupError> {
        let prefixes = [
            COLLECTIBLE_PROBABILITY_PREFIX,
            COLLECTIBLE_PRICE_PREFIX,
            COLLECTIBLE_EXPIRATION_PREFIX,
        ];
        let Some((prefix, kind)) = prefixes
            .iter()
            .find_map(|p| key.strip_prefix(p).map(|rest| (*p, rest)))
        else {
            return Ok(false);
        };
        let Some(kind) = CollectibleKind::from_name(kind) else {
            return Ok(false);
        };
        let rule = self.collectibles.entry(kind).or_default();

        match prefix {
            COLLECTIBLE_PROBABILITY_PREFIX => {
                let p: f64 = parse_value(key, value)?;
                if !(0.0..=1.0).contains(&p) {
                    return Err(invalid(key, value, "probability must be within [0, 1]"));
                }
                rule.probability = p;
            }
            COLLECTIBLE_PRICE_PREFIX => rule.points = parse_value(key, value)?,
            _ => {
                rule.expiration = match value.to_ascii_lowercase().as_str() {
                    "never" | "none" | "0" => None,
                    _ => Some(parse_value(key, value)?),
                };
            }
        }
        Ok(true)
    }

    pub fn rule(&self, kind: CollectibleKind) -> CollectibleRule {
        self.collectibles.get(&kind).copied().unwrap_or_default()
    }
}

/// Split properties text into ordered `(key, value)` pairs. `#` and `!` start
/// comments; `=` or `:` separate key from value.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| match line.find(['=', ':']) {
            Some(idx) => (
                line[..idx].trim().to_string(),
                line[idx + 1..].trim().to_string(),
            ),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, SetupError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn invalid(key: &str, value: &str, reason: &str) -> SetupError {
    SetupError::Config {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = GameConfig::parse("").unwrap();
        assert_eq!(c.worm_length, 1);
        assert_eq!(c.max_inactive_turns, 3);
        assert_eq!(c.max_turns, 1000);
        assert_eq!(c.survival_bonus, 1);
        assert_eq!(c.decision_timeout, Duration::from_secs(1));
        assert_eq!(c.seed, None);
        for kind in CollectibleKind::ALL {
            assert_eq!(c.rule(kind), CollectibleRule::default());
        }
    }

    #[test]
    fn test_parse_full() {
        let text = r#"
            # game rules
            playground.file = arenas/basic.txt
            worm.length.start=3
            worm.max.inactive.turns: 5
            worm.max.turns=200
            worm.survival.bonus=2
            worm.timeout.seconds=0.25
            game.seed=42
            collectible.probability.good=0.5
            collectible.price.good=5
            collectible.expiration.good=10
            collectible.expiration.extreme=never
            something.else=ignored
        "#;
        let c = GameConfig::parse(text).unwrap();
        assert_eq!(c.playground_file.as_deref(), Some("arenas/basic.txt"));
        assert_eq!(c.worm_length, 3);
        assert_eq!(c.max_inactive_turns, 5);
        assert_eq!(c.max_turns, 200);
        assert_eq!(c.survival_bonus, 2);
        assert_eq!(c.decision_timeout, Duration::from_millis(250));
        assert_eq!(c.seed, Some(42));
        let good = c.rule(CollectibleKind::Good);
        assert_eq!(good.probability, 0.5);
        assert_eq!(good.points, 5);
        assert_eq!(good.expiration, Some(10));
        assert_eq!(c.rule(CollectibleKind::Extreme).expiration, None);
        assert_eq!(c.rule(CollectibleKind::Cheap), CollectibleRule::default());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            GameConfig::parse("worm.max.turns=lots"),
            Err(SetupError::Config { .. })
        ));
        assert!(GameConfig::parse("worm.length.start=0").is_err());
        assert!(GameConfig::parse("worm.timeout.seconds=-1").is_err());
        assert!(matches!(
            GameConfig::parse("worm.timeout.seconds=1e20"),
            Err(SetupError::Config { .. })
        ));
        assert!(GameConfig::parse("collectible.probability.cheap=1.5").is_err());
        assert!(GameConfig::parse("collectible.price.cheap=x").is_err());
    }

    #[test]
    fn test_parse_properties_keeps_order() {
        let props = parse_properties("b=2\n! comment\na = 1\nflag");
        assert_eq!(
            props,
            vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }
}
