//! # Group State Machine
//!
//! Grouping levels are declared outer to inner. On every record the tracker
//! extracts each level's key and decides which levels changed: a level
//! changes when its own key differs from the stored key, or when any outer
//! level already changed — change propagates downward, monotonically.
//! Stored keys are snapshotted right after change computation; footer
//! *content* renders against the previous record, so a footer reflects the
//! group that is ending, not the one starting.
//!
//! The open groups live on a stack whose order always matches declaration
//! order: no inner group is ever open without all of its outers.

use log::debug;

use crate::error::{ReportError, Result};
use crate::model::Group;
use crate::record::{get_attr_value, Record, RecordRef, Value};

use super::{KeyCompare, LayoutEngine};

/// Tracks stored group keys and the stack of open groups across records.
#[derive(Debug, Default)]
pub struct GroupTracker {
    stored: Vec<Option<Value>>,
    stack: Vec<usize>,
}

impl GroupTracker {
    pub fn new(level_count: usize) -> Self {
        Self {
            stored: vec![None; level_count],
            stack: Vec::with_capacity(level_count),
        }
    }

    /// Compute which levels changed for this record and snapshot the new
    /// keys. Returns one flag per declared group, outer to inner.
    pub fn compute_changes(
        &mut self,
        groups: &[Group],
        record: &dyn Record,
        compare: Option<&KeyCompare>,
    ) -> Result<Vec<bool>> {
        let mut changed = vec![false; groups.len()];
        let mut outer_changed = false;

        for (i, group) in groups.iter().enumerate() {
            let key = get_attr_value(record, &group.attribute)?;
            let same = match (&self.stored[i], compare) {
                (None, _) => false,
                (Some(prev), Some(eq)) => eq(prev, &key),
                (Some(prev), None) => *prev == key,
            };
            let level_changed = outer_changed || !same;
            changed[i] = level_changed;
            outer_changed = level_changed;
            self.stored[i] = Some(key);
        }

        Ok(changed)
    }

    /// Push an opened group level. Levels are pushed in declaration order.
    pub fn push(&mut self, index: usize) {
        self.stack.push(index);
    }

    /// Pop the innermost open group level.
    pub fn pop(&mut self) -> Result<usize> {
        self.stack.pop().ok_or(ReportError::GroupStackUnderflow)
    }

    /// The innermost open group level, if any.
    pub fn top(&self) -> Option<usize> {
        self.stack.last().copied()
    }

    /// Open group levels, outermost first.
    pub fn open_levels(&self) -> &[usize] {
        &self.stack
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl LayoutEngine<'_> {
    /// Emit footer bands for groups that ended with this record and header
    /// bands for groups that started, honoring per-group forced breaks.
    pub(crate) fn emit_group_bands(
        &mut self,
        changed: &[bool],
        record: &RecordRef,
        prev: Option<&RecordRef>,
    ) -> Result<()> {
        let Some(first) = changed.iter().position(|&c| c) else {
            return Ok(());
        };

        // Footers innermost -> outermost, rendered against the record that
        // is ending the group.
        if let Some(prev) = prev {
            while self.tracker.top().is_some_and(|level| level >= first) {
                let level = self.tracker.pop()?;
                debug!("closing group level {level}");
                if let Some(footer) = self.report.groups[level].footer.clone() {
                    self.ensure_band_fits(&footer)?;
                    self.position_band(&footer, Some(prev.as_ref()))?;
                }
            }
        }

        // Headers outermost -> innermost for every changed level.
        for level in first..self.report.groups.len() {
            let group = self.report.groups[level].clone();
            debug!("opening group level {level} ({})", group.attribute);
            if group.force_new_page && !self.first_record_on_page {
                self.break_page()?;
            }
            if let Some(header) = group.header {
                self.ensure_band_fits(&header)?;
                self.position_band(&header, Some(record.as_ref()))?;
            }
            self.tracker.push(level);
        }

        Ok(())
    }

    /// Force-close every remaining open group after the final record.
    pub(crate) fn flush_group_footers(&mut self, last: &dyn Record) -> Result<()> {
        while !self.tracker.is_empty() {
            let level = self.tracker.pop()?;
            debug!("flushing group level {level}");
            if let Some(footer) = self.report.groups[level].footer.clone() {
                self.ensure_band_fits(&footer)?;
                self.position_band(&footer, Some(last))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn groups(attrs: &[&str]) -> Vec<Group> {
        attrs.iter().map(|a| Group::on(a)).collect()
    }

    #[test]
    fn first_record_changes_every_level() {
        let groups = groups(&["region", "city"]);
        let mut tracker = GroupTracker::new(2);
        let record = json!({"region": "north", "city": "Porto"});
        let changed = tracker.compute_changes(&groups, &record, None).unwrap();
        assert_eq!(changed, vec![true, true]);
    }

    #[test]
    fn unchanged_keys_change_nothing() {
        let groups = groups(&["region", "city"]);
        let mut tracker = GroupTracker::new(2);
        let record = json!({"region": "north", "city": "Porto"});
        tracker.compute_changes(&groups, &record, None).unwrap();
        let changed = tracker.compute_changes(&groups, &record, None).unwrap();
        assert_eq!(changed, vec![false, false]);
    }

    #[test]
    fn outer_change_propagates_to_inner_levels() {
        let groups = groups(&["region", "city"]);
        let mut tracker = GroupTracker::new(2);
        let first = json!({"region": "north", "city": "Porto"});
        tracker.compute_changes(&groups, &first, None).unwrap();

        // Same city, different region: both levels must change.
        let second = json!({"region": "south", "city": "Porto"});
        let changed = tracker.compute_changes(&groups, &second, None).unwrap();
        assert_eq!(changed, vec![true, true]);
    }

    #[test]
    fn inner_change_leaves_outer_untouched() {
        let groups = groups(&["region", "city"]);
        let mut tracker = GroupTracker::new(2);
        let first = json!({"region": "north", "city": "Porto"});
        tracker.compute_changes(&groups, &first, None).unwrap();

        let second = json!({"region": "north", "city": "Braga"});
        let changed = tracker.compute_changes(&groups, &second, None).unwrap();
        assert_eq!(changed, vec![false, true]);
    }

    #[test]
    fn custom_comparison_overrides_structural_equality() {
        use std::sync::Arc;
        let groups = groups(&["name"]);
        let mut tracker = GroupTracker::new(1);
        // Case-insensitive keys.
        let compare: KeyCompare = Arc::new(|a: &Value, b: &Value| {
            a.as_str().map(str::to_lowercase) == b.as_str().map(str::to_lowercase)
        });

        tracker
            .compute_changes(&groups, &json!({"name": "Ada"}), Some(&compare))
            .unwrap();
        let changed = tracker
            .compute_changes(&groups, &json!({"name": "ADA"}), Some(&compare))
            .unwrap();
        assert_eq!(changed, vec![false]);
    }

    #[test]
    fn missing_group_key_is_a_configuration_error() {
        let groups = groups(&["region"]);
        let mut tracker = GroupTracker::new(1);
        let err = tracker
            .compute_changes(&groups, &json!({"other": 1}), None)
            .unwrap_err();
        assert!(matches!(err, ReportError::AttributeNotFound { .. }));
    }

    #[test]
    fn popping_an_empty_stack_is_an_invariant_violation() {
        let mut tracker = GroupTracker::new(1);
        assert!(matches!(
            tracker.pop(),
            Err(ReportError::GroupStackUnderflow)
        ));
    }

    #[test]
    fn stack_order_matches_declaration_order() {
        let mut tracker = GroupTracker::new(3);
        tracker.push(0);
        tracker.push(1);
        tracker.push(2);
        assert_eq!(tracker.open_levels(), &[0, 1, 2]);
        assert_eq!(tracker.pop().unwrap(), 2);
        assert_eq!(tracker.top(), Some(1));
    }
}
