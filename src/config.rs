use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::pipeline::routing::{RoutingTable, TYPE_MAX, TYPE_SLOTS};
use crate::DynError;

fn default_queue_capacity() -> usize {
    1 << 14
}

/// Scenario configuration, loaded from a JSON file.
///
/// Routing rules are sparse: a type without a rule falls through to shard 0
/// on both stages. `queue_capacity` and `pin_threads` have defaults so
/// minimal scenario files load unchanged.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub duration_secs: u64,
    pub producers: RoleConfig,
    pub processors: RoleConfig,
    pub strategies: RoleConfig,

    #[serde(default)]
    pub stage1_rules: Vec<Stage1Rule>,

    #[serde(default)]
    pub stage2_rules: Vec<Stage2Rule>,

    /// Slots per ring; power of two. Default 16384.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Pin role threads to sequential cores (core 0 left to the OS).
    #[serde(default)]
    pub pin_threads: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub count: usize,
}

/// Stage-1 routing rule: one message type to a processor shard.
#[derive(Debug, Clone, Deserialize)]
pub struct Stage1Rule {
    pub msg_type: u8,
    /// Destination processors; the first entry is the routed shard.
    pub processors: Vec<usize>,
}

/// Stage-2 routing rule: one message type to a strategy shard.
#[derive(Debug, Clone, Deserialize)]
pub struct Stage2Rule {
    pub msg_type: u8,
    pub strategy: usize,
}

impl Config {
    /// Read, parse, and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, DynError> {
        let data = fs::read_to_string(path)
            .map_err(|e| format!("cannot open config file {}: {}", path.display(), e))?;

        let cfg: Config = serde_json::from_str(&data)
            .map_err(|e| format!("cannot parse config file {}: {}", path.display(), e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Range-check everything the pipeline assumes at runtime. Any
    /// violation refuses to start.
    pub fn validate(&self) -> Result<(), DynError> {
        if self.duration_secs == 0 {
            return Err("duration_secs must be at least 1".into());
        }
        if self.producers.count == 0 {
            return Err("producers.count must be at least 1".into());
        }
        if self.processors.count == 0 {
            return Err("processors.count must be at least 1".into());
        }
        if self.strategies.count == 0 {
            return Err("strategies.count must be at least 1".into());
        }

        // Ids travel inside the message as a single byte.
        if self.producers.count > 256 {
            return Err("producers.count must fit an 8-bit id (max 256)".into());
        }
        if self.processors.count > 256 {
            return Err("processors.count must fit an 8-bit id (max 256)".into());
        }

        if !self.queue_capacity.is_power_of_two() || self.queue_capacity < 2 {
            return Err(format!(
                "queue_capacity must be a power of two >= 2, got {}",
                self.queue_capacity,
            )
            .into());
        }

        for rule in &self.stage1_rules {
            if rule.msg_type > TYPE_MAX {
                return Err(format!(
                    "stage1 rule msg_type {} out of range (max {})",
                    rule.msg_type, TYPE_MAX,
                )
                .into());
            }
            match rule.processors.first() {
                Some(&dest) if dest < self.processors.count => {}
                Some(&dest) => {
                    return Err(format!(
                        "stage1 route for msg_type {} targets processor {} but only {} exist",
                        rule.msg_type, dest, self.processors.count,
                    )
                    .into());
                }
                None => {
                    return Err(format!(
                        "stage1 rule for msg_type {} lists no processors",
                        rule.msg_type,
                    )
                    .into());
                }
            }
        }

        for rule in &self.stage2_rules {
            if rule.msg_type > TYPE_MAX {
                return Err(format!(
                    "stage2 rule msg_type {} out of range (max {})",
                    rule.msg_type, TYPE_MAX,
                )
                .into());
            }
            if rule.strategy >= self.strategies.count {
                return Err(format!(
                    "stage2 route for msg_type {} targets strategy {} but only {} exist",
                    rule.msg_type, rule.strategy, self.strategies.count,
                )
                .into());
            }
        }

        Ok(())
    }

    /// Dense stage-1 table; unlisted types route to processor 0.
    pub fn stage1_table(&self) -> RoutingTable {
        let mut targets = [0usize; TYPE_SLOTS];
        for rule in &self.stage1_rules {
            if let Some(&dest) = rule.processors.first() {
                targets[rule.msg_type as usize] = dest;
            }
        }
        RoutingTable::new(targets)
    }

    /// Dense stage-2 table; unlisted types route to strategy 0.
    pub fn stage2_table(&self) -> RoutingTable {
        let mut targets = [0usize; TYPE_SLOTS];
        for rule in &self.stage2_rules {
            targets[rule.msg_type as usize] = rule.strategy;
        }
        RoutingTable::new(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Config {
        serde_json::from_str(json).expect("valid json")
    }

    fn fan_out_config() -> Config {
        parse(
            r#"{
                "duration_secs": 2,
                "producers":  { "count": 1 },
                "processors": { "count": 4 },
                "strategies": { "count": 4 },
                "stage1_rules": [
                    { "msg_type": 0, "processors": [0] },
                    { "msg_type": 1, "processors": [1] },
                    { "msg_type": 2, "processors": [2] },
                    { "msg_type": 3, "processors": [3] }
                ],
                "stage2_rules": [
                    { "msg_type": 0, "strategy": 0 },
                    { "msg_type": 1, "strategy": 1 },
                    { "msg_type": 2, "strategy": 2 },
                    { "msg_type": 3, "strategy": 3 }
                ]
            }"#,
        )
    }

    #[test]
    fn test_parse_with_defaults() {
        let cfg = fan_out_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.duration_secs, 2);
        assert_eq!(cfg.processors.count, 4);
        assert_eq!(cfg.queue_capacity, 1 << 14);
        assert!(!cfg.pin_threads);
    }

    #[test]
    fn test_tables_fill_unlisted_types_with_zero() {
        let cfg = fan_out_config();
        let stage1 = cfg.stage1_table();
        let stage2 = cfg.stage2_table();

        for msg_type in 0..4u8 {
            assert_eq!(stage1.route(msg_type), msg_type as usize);
            assert_eq!(stage2.route(msg_type), msg_type as usize);
        }
        for msg_type in 4..=TYPE_MAX {
            assert_eq!(stage1.route(msg_type), 0);
            assert_eq!(stage2.route(msg_type), 0);
        }
    }

    #[test]
    fn test_rejects_zero_counts() {
        let mut cfg = fan_out_config();
        cfg.producers.count = 0;
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("producers.count"));

        let mut cfg = fan_out_config();
        cfg.duration_secs = 0;
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("duration_secs"));
    }

    #[test]
    fn test_rejects_out_of_range_routes() {
        let mut cfg = fan_out_config();
        cfg.stage1_rules[1].processors = vec![4];
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("targets processor 4"));

        let mut cfg = fan_out_config();
        cfg.stage2_rules[2].strategy = 9;
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("targets strategy 9"));
    }

    #[test]
    fn test_rejects_out_of_range_msg_type() {
        let mut cfg = fan_out_config();
        cfg.stage1_rules[0].msg_type = TYPE_MAX + 1;
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_rejects_empty_processor_list() {
        let mut cfg = fan_out_config();
        cfg.stage1_rules[0].processors.clear();
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("lists no processors"));
    }

    #[test]
    fn test_rejects_bad_queue_capacity() {
        let mut cfg = fan_out_config();
        cfg.queue_capacity = 1000;
        let err = cfg.validate().expect_err("should fail");
        assert!(err.to_string().contains("power of two"));

        let mut cfg = fan_out_config();
        cfg.queue_capacity = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/scenario.json")).expect_err("should fail");
        assert!(err.to_string().contains("cannot open config file"));
    }
}
