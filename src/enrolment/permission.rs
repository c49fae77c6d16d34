//! Branch and year eligibility for events.
//!
//! Events store their allow-lists as JSON arrays in two text columns. Nothing outside this module
//! reads or writes those strings: callers go through [`EligibilityDescriptor`].

use crate::{
    error::{CampusError, DescriptorAxis, EncodeDescriptorSnafu, MalformedDescriptorSnafu},
    state::{
        db::CampusDb,
        db_objects::{DbEvent, DbStudent, StoredDescriptor},
    },
};
use itertools::Itertools;
use serde::Serialize;
use snafu::ResultExt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EligibilityDescriptor {
    pub allow_all_branch: bool,
    pub allow_all_year: bool,
    pub branch_ids: Vec<u32>,
    pub years: Vec<u32>,
}

fn decode_list(raw: &str, axis: DescriptorAxis) -> Result<Vec<u32>, CampusError> {
    let trimmed = raw.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }

    serde_json::from_str(trimmed).context(MalformedDescriptorSnafu {
        axis,
        raw: raw.to_string(),
    })
}

fn encode_list(list: &[u32], axis: DescriptorAxis) -> Result<String, CampusError> {
    if list.is_empty() {
        return Ok(String::new());
    }
    serde_json::to_string(list).context(EncodeDescriptorSnafu { axis })
}

impl EligibilityDescriptor {
    pub fn allow_everyone() -> Self {
        Self {
            allow_all_branch: true,
            allow_all_year: true,
            branch_ids: vec![],
            years: vec![],
        }
    }

    /// Picks the allow-all flags from which lists are non-empty. An empty list means that axis is
    /// open to everyone. Duplicates are dropped, first occurrence wins.
    pub fn from_lists(branch_ids: Vec<u32>, years: Vec<u32>) -> Self {
        let branch_ids: Vec<u32> = branch_ids.into_iter().unique().collect();
        let years: Vec<u32> = years.into_iter().unique().collect();

        Self {
            allow_all_branch: branch_ids.is_empty(),
            allow_all_year: years.is_empty(),
            branch_ids,
            years,
        }
    }

    /// Like [`Self::from_lists`], but every branch has to exist first. The first unknown branch
    /// aborts the build.
    #[instrument(level = "debug", skip(db))]
    pub async fn build(
        db: &CampusDb,
        branch_ids: Vec<u32>,
        years: Vec<u32>,
    ) -> Result<Self, CampusError> {
        let descriptor = Self::from_lists(branch_ids, years);

        for &branch_id in &descriptor.branch_ids {
            let exists = match i32::try_from(branch_id) {
                Ok(id) => db.branch_exists(id).await?,
                Err(_) => false,
            };
            if !exists {
                return Err(CampusError::UnknownBranch { branch_id });
            }
        }

        Ok(descriptor)
    }

    pub fn decode(stored: &StoredDescriptor) -> Result<Self, CampusError> {
        Ok(Self {
            allow_all_branch: stored.allow_all_branch,
            allow_all_year: stored.allow_all_year,
            branch_ids: decode_list(&stored.branch_ids, DescriptorAxis::Branches)?,
            years: decode_list(&stored.years, DescriptorAxis::Years)?,
        })
    }

    pub fn of_event(event: &DbEvent) -> Result<Self, CampusError> {
        Ok(Self {
            allow_all_branch: event.allow_all_branch,
            allow_all_year: event.allow_all_year,
            branch_ids: decode_list(&event.branch_ids, DescriptorAxis::Branches)?,
            years: decode_list(&event.years, DescriptorAxis::Years)?,
        })
    }

    /// Lists are only written for axes that are restricted.
    pub fn encode(&self) -> Result<StoredDescriptor, CampusError> {
        let branch_ids = if self.allow_all_branch {
            String::new()
        } else {
            encode_list(&self.branch_ids, DescriptorAxis::Branches)?
        };
        let years = if self.allow_all_year {
            String::new()
        } else {
            encode_list(&self.years, DescriptorAxis::Years)?
        };

        Ok(StoredDescriptor {
            allow_all_branch: self.allow_all_branch,
            allow_all_year: self.allow_all_year,
            branch_ids,
            years,
        })
    }

    pub fn admits(&self, branch_id: i32, year: i32) -> bool {
        let in_list = |list: &[u32], value: i32| {
            u32::try_from(value).is_ok_and(|value| list.contains(&value))
        };

        let branch_ok = self.allow_all_branch || in_list(&self.branch_ids, branch_id);
        let year_ok = self.allow_all_year || in_list(&self.years, year);
        branch_ok && year_ok
    }
}

pub fn is_eligible(event: &DbEvent, student: &DbStudent) -> Result<bool, CampusError> {
    Ok(EligibilityDescriptor::of_event(event)?.admits(student.branch_id, student.year))
}
