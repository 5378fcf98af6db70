use env_param::EnvParam;

/// Whether rules shared by all car types are compiled once instead of once per type.
pub static MERGE_RULES: EnvParam<bool> = EnvParam::new("CARCONF_MERGE_RULES", "true");

/// Penalty weight of the product constraints introduced when reducing penalties to degree two.
pub static PENALTY_STRENGTH: EnvParam<i64> = EnvParam::new("CARCONF_PENALTY_STRENGTH", "100");
