//! Scan options: the boolean capabilities a caller enables for a resolution, looked up by stable
//! option keys.

use std::collections::HashMap;

/// Accept tables whose current snapshot has delete files
pub const MERGE_ON_READ_SCAN: &str = "iceberg.merge_on_read_scan.enabled";
/// Accept tables whose current snapshot has equality deletes
pub const EQUALITY_DELETE_SCAN: &str = "iceberg.merge_on_read_scan.equality_delete.enabled";
/// Convert map columns rather than dropping them from the reported schema
pub const MAP_DATA_TYPE: &str = "iceberg.map_data_type.enabled";

/// Answers boolean option lookups by key. `None` means the option is not set.
pub trait OptionResolver {
    fn bool_option(&self, key: &str) -> Option<bool>;
}

/// Typed view of the options a resolution consults. Parsing is infallible: keys that are not
/// recognized, and recognized keys whose values do not parse, land in `unknown_options`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub merge_on_read_scan: bool,
    pub equality_delete_scan: bool,
    pub map_data_type: bool,
    pub unknown_options: HashMap<String, String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            merge_on_read_scan: false,
            equality_delete_scan: false,
            map_data_type: true,
            unknown_options: HashMap::new(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl ScanOptions {
    /// Read every known option from `resolver`, falling back to defaults for the unset ones.
    pub fn from_resolver(resolver: &dyn OptionResolver) -> Self {
        let defaults = Self::default();
        Self {
            merge_on_read_scan: resolver
                .bool_option(MERGE_ON_READ_SCAN)
                .unwrap_or(defaults.merge_on_read_scan),
            equality_delete_scan: resolver
                .bool_option(EQUALITY_DELETE_SCAN)
                .unwrap_or(defaults.equality_delete_scan),
            map_data_type: resolver
                .bool_option(MAP_DATA_TYPE)
                .unwrap_or(defaults.map_data_type),
            unknown_options: defaults.unknown_options,
        }
    }

    #[must_use]
    pub fn with_merge_on_read_scan(mut self, enabled: bool) -> Self {
        self.merge_on_read_scan = enabled;
        self
    }

    #[must_use]
    pub fn with_equality_delete_scan(mut self, enabled: bool) -> Self {
        self.equality_delete_scan = enabled;
        self
    }

    #[must_use]
    pub fn with_map_data_type(mut self, enabled: bool) -> Self {
        self.map_data_type = enabled;
        self
    }
}

impl<K, V, I> From<I> for ScanOptions
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str> + Into<String>,
    V: AsRef<str> + Into<String>,
{
    fn from(unparsed: I) -> Self {
        let mut options = ScanOptions::default();
        for (k, v) in unparsed {
            let parsed = parse_bool(v.as_ref());
            let slot = match k.as_ref() {
                MERGE_ON_READ_SCAN => Some(&mut options.merge_on_read_scan),
                EQUALITY_DELETE_SCAN => Some(&mut options.equality_delete_scan),
                MAP_DATA_TYPE => Some(&mut options.map_data_type),
                _ => None,
            };
            if let (Some(slot), Some(value)) = (slot, parsed) {
                *slot = value;
                continue;
            }
            options.unknown_options.insert(k.into(), v.into());
        }
        options
    }
}

impl OptionResolver for ScanOptions {
    fn bool_option(&self, key: &str) -> Option<bool> {
        match key {
            MERGE_ON_READ_SCAN => Some(self.merge_on_read_scan),
            EQUALITY_DELETE_SCAN => Some(self.equality_delete_scan),
            MAP_DATA_TYPE => Some(self.map_data_type),
            _ => self.unknown_options.get(key).and_then(|v| parse_bool(v)),
        }
    }
}

impl OptionResolver for HashMap<String, String> {
    fn bool_option(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| parse_bool(v))
    }
}
