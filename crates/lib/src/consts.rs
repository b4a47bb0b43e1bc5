//! Key layout tags, reserved names and timing constants shared by every
//! substrate.

use std::time::Duration;

pub const APP_NAME: &str = "dps";

/// `0` + b64(store name) -> store id
pub const STORE_NAME_TAG: &str = "0";
/// `1` + id -> store metadata block, native map or scan container
pub const STORE_INFO_TAG: &str = "1";
/// `2` + id + `_` + segment -> comma-joined encoded keys
pub const CATALOG_TAG: &str = "2";
/// `3` + id + `_` + b64(key) -> `segment_value`
pub const DATA_ITEM_TAG: &str = "3";
/// `4` + id + `dps_lock`
pub const STORE_LOCK_TAG: &str = "4";
/// `5` + b64(lock name) -> lock id
pub const LOCK_NAME_TAG: &str = "5";
/// `6` + id -> `usage_expiry_pid_b64name`
pub const LOCK_INFO_TAG: &str = "6";
/// `7` + id + `dl_lock`
pub const LOCK_TAG: &str = "7";
/// `501` + entity + `generic_lock`
pub const GENERIC_LOCK_TAG: &str = "501";

pub const STORE_LOCK_TOKEN: &str = "dps_lock";
pub const LOCK_TOKEN: &str = "dl_lock";
pub const GENERIC_LOCK_TOKEN: &str = "generic_lock";

/// Shared counter for store and lock ids.
pub const GUID_KEY: &str = "dps_and_dl_guid";

pub const STORE_NAME_FIELD: &str = "dps_name_of_this_store";
pub const KEY_TYPE_FIELD: &str = "dps_spl_type_name_of_key";
pub const VALUE_TYPE_FIELD: &str = "dps_spl_type_name_of_value";
pub const RESERVED_FIELDS: [&str; 3] = [STORE_NAME_FIELD, KEY_TYPE_FIELD, VALUE_TYPE_FIELD];

pub const METADATA_DELIMITER: &str = "_^^_";
pub const DEFAULT_MAX_SEGMENT_BYTES: usize = 512 * 1024;

/// Container holding the slot-pool tracker records.
pub const STORE_ID_TRACKER_CONTAINER: &str = "dps_store_id_tracker";
pub const SLOT_ALLOCATION_MUTEX: &str = "get_store_id_not_in_use_lock";
pub const DEFAULT_SLOT_COUNT: u32 = 1000;
/// Upper bound on scan containers a substrate will ever create.
pub const DEFAULT_CONTAINER_BUDGET: u32 = 1023;

pub const MUTEX_TTL: Duration = Duration::from_secs(5);
pub const MUTEX_SLEEP: Duration = Duration::from_micros(200);
pub const MUTEX_MAX_RETRY: u32 = 10_000;

pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(315_360_000);
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(15);
/// Lease and wait used internally by `remove_lock`.
pub const REMOVE_LOCK_LEASE: Duration = Duration::from_secs(5);
pub const REMOVE_LOCK_WAIT: Duration = Duration::from_secs(3);

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DPS_CONFIG";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DPS_DATA_DIR";
pub const CONFIG_FILENAME: &str = "config.toml";
