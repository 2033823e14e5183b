use crate::error::{PickerError, PickerResult};

/// Identity of an upload, taken from `<timestamp>_<campaign>_<template>_<name>`.
///
/// The name is split on the first three underscores only, so underscores in
/// the original file name survive: `20240101_c_t_my_file.csv` has
/// `original_name == "my_file.csv"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFileName {
    pub timestamp: String,
    pub campaign_id: String,
    pub template_id: String,
    pub original_name: String,
}

impl SourceFileName {
    pub fn parse(file_name: &str) -> PickerResult<Self> {
        let mut parts = file_name.splitn(4, '_');
        let mut next = || {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .ok_or_else(|| PickerError::InvalidFileName(file_name.to_string()))
        };
        Ok(Self {
            timestamp: next()?,
            campaign_id: next()?,
            template_id: next()?,
            original_name: next()?,
        })
    }
}

/// `true` for names ending in `.csv`, ignoring ASCII case.
pub fn is_csv(file_name: &str) -> bool {
    let len = file_name.len();
    len > 4
        && file_name.is_char_boundary(len - 4)
        && file_name[len - 4..].eq_ignore_ascii_case(".csv")
}
