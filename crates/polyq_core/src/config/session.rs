use std::collections::HashMap;
use std::sync::LazyLock;

use polyq_error::{DbError, Result};

use crate::arrays::scalar::ScalarValue;

/// Configuration for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub enable_hash_joins: bool,
    pub enable_hint_pushdown: bool,
    pub cte_worker_threads: u64,
    pub allow_duplicate_cte_names: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            enable_hash_joins: true,
            enable_hint_pushdown: true,
            cte_worker_threads: num_cpus::get() as u64,
            allow_duplicate_cte_names: false,
        }
    }
}

impl SessionConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();

        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        let scalar = (func.get)(&def_conf);
        (func.set)(scalar, self)
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Names and descriptions of every setting, sorted by name.
    pub fn describe_settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_unstable();
        settings
    }
}

struct SettingFunctions {
    set: fn(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>,
    get: fn(conf: &SessionConfig) -> ScalarValue,
    description: &'static str,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
            description: S::DESCRIPTION,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    let prev = map.insert(S::NAME, SettingFunctions::new::<S>());
    debug_assert!(prev.is_none(), "Duplicate settings names: {}", S::NAME);
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<EnableHashJoins>(&mut map);
    insert_setting::<EnableHintPushdown>(&mut map);
    insert_setting::<CteWorkerThreads>(&mut map);
    insert_setting::<AllowDuplicateCteNames>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>;
    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue;
}

fn expect_bool(name: &str, scalar: &ScalarValue) -> Result<bool> {
    scalar
        .try_as_bool()?
        .ok_or_else(|| DbError::new(format!("Setting '{name}' cannot be NULL")))
}

pub struct EnableHashJoins;

impl SessionSetting for EnableHashJoins {
    const NAME: &'static str = "enable_hash_joins";
    const DESCRIPTION: &'static str = "Use hash joins for joins on equality conditions";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.enable_hash_joins = expect_bool(Self::NAME, &scalar)?;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.enable_hash_joins.into()
    }
}

pub struct EnableHintPushdown;

impl SessionSetting for EnableHintPushdown {
    const NAME: &'static str = "enable_hint_pushdown";
    const DESCRIPTION: &'static str = "Push SKIP/TAKE into data sources for single table queries";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.enable_hint_pushdown = expect_bool(Self::NAME, &scalar)?;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.enable_hint_pushdown.into()
    }
}

const MIN_CTE_WORKER_THREADS: i64 = 1;
const MAX_CTE_WORKER_THREADS: i64 = 512;

pub struct CteWorkerThreads;

impl SessionSetting for CteWorkerThreads {
    const NAME: &'static str = "cte_worker_threads";
    const DESCRIPTION: &'static str =
        "Number of threads used to materialize CTEs of the same level";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_as_i64()?;
        if !(MIN_CTE_WORKER_THREADS..=MAX_CTE_WORKER_THREADS).contains(&val) {
            return Err(DbError::new(format!(
                "CTE worker threads must be between {MIN_CTE_WORKER_THREADS} and {MAX_CTE_WORKER_THREADS}"
            ))
            .with_field("value", val));
        }
        conf.cte_worker_threads = val as u64;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        (conf.cte_worker_threads as i64).into()
    }
}

pub struct AllowDuplicateCteNames;

impl SessionSetting for AllowDuplicateCteNames {
    const NAME: &'static str = "allow_duplicate_cte_names";
    const DESCRIPTION: &'static str =
        "Accept duplicate CTE names in a WITH block, the last definition wins";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.allow_duplicate_cte_names = expect_bool(Self::NAME, &scalar)?;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.allow_duplicate_cte_names.into()
    }
}
