//! Single round-trip group reads, plus the single-item read and write paths.
//!
//! This is the only place that deals with the provider's one-based arrays:
//! handles go out as a [`OneBasedArray`] and every reply array is re-indexed
//! to the zero-based ordinal positions used by [`ItemIndex`](crate::ItemIndex).

use crate::error::{S_OK, TagError, TagResult, format_error_code};
use crate::helpers::{
    is_good_quality, quality_to_string, timestamp_to_string, value_to_string, value_to_text,
};
use crate::provider::{ItemHandle, ItemReading, OneBasedArray, OpcValue, ProviderConnection};
use crate::registry::{Group, GroupRegistry};
use chrono::{DateTime, Utc};

/// Normalized outcome of one group read.
///
/// All five sequences have the same length and position `i` in each of
/// them describes the same item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResult {
    names: Vec<String>,
    values: Vec<String>,
    raw_values: Vec<OpcValue>,
    qualities: Vec<u16>,
    errors: Vec<i32>,
    timestamps: Vec<DateTime<Utc>>,
}

impl ReadResult {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Values as lossless text: full float precision, unquoted strings.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn raw_values(&self) -> &[OpcValue] {
        &self.raw_values
    }

    /// Raw OPC quality codes.
    pub fn qualities(&self) -> &[u16] {
        &self.qualities
    }

    /// Per-item provider status codes; [`S_OK`] on success.
    pub fn errors(&self) -> &[i32] {
        &self.errors
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of items whose read reported a non-zero status.
    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|code| **code != S_OK).count()
    }

    /// Display rows, one per item in ordinal order.
    pub fn rows(&self) -> impl Iterator<Item = TagValue> + '_ {
        (0..self.len()).map(|i| TagValue {
            tag_id: self.names[i].clone(),
            value: value_to_string(&self.raw_values[i]),
            quality: quality_to_string(self.qualities[i]),
            good_quality: is_good_quality(self.qualities[i]),
            error: (self.errors[i] != S_OK).then(|| format_error_code(self.errors[i])),
            timestamp: timestamp_to_string(&self.timestamps[i]),
        })
    }
}

/// A single tag's read result, formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValue {
    /// The tag name (e.g., `"[PLC5]N7:0"`).
    pub tag_id: String,
    /// The current value as a display string.
    pub value: String,
    /// OPC quality indicator (`"Good"`, `"Bad"`, or `"Uncertain"`).
    pub quality: String,
    /// Whether the raw quality code is in the good range.
    pub good_quality: bool,
    /// Provider status if the item could not be read.
    pub error: Option<String>,
    /// Timestamp of the last value change, formatted as a local time string.
    pub timestamp: String,
}

/// Result of writing to one matching item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// The tag that was written to.
    pub tag_id: String,
    /// Name of the group holding the item.
    pub group: String,
    /// Whether the write succeeded.
    pub success: bool,
    /// Error message if the write failed, `None` on success.
    pub error: Option<String>,
}

/// Stateless read/write paths over a [`GroupRegistry`].
pub struct BatchReadEngine;

impl BatchReadEngine {
    /// Reads every item of `group` in one provider round trip.
    ///
    /// Per-item failures land in [`ReadResult::errors`]; only a failed round
    /// trip or a reply that does not line up with the request is an `Err`.
    pub fn read_group<P>(provider: &mut P, group: &Group) -> TagResult<ReadResult>
    where
        P: ProviderConnection + ?Sized,
    {
        let span = tracing::info_span!(
            "tag.read_group",
            group = %group.name,
            item_count = group.items.len()
        );
        let _enter = span.enter();

        if !group.active {
            tracing::warn!("read_group: group is inactive, qualities may be stale");
        }

        let item_count = group.items.len();
        if item_count == 0 {
            tracing::debug!("read_group: group has no items, skipping round trip");
            return Ok(ReadResult::default());
        }

        let handles: OneBasedArray<ItemHandle> =
            group.items.iter().map(|item| item.handle).collect();

        let reply = provider.batch_read(group.handle, &handles)?;

        let values = rebase(&reply.values, item_count, "values")?;
        let errors = rebase(&reply.errors, item_count, "errors")?;
        let qualities = rebase(&reply.qualities, item_count, "qualities")?;
        let timestamps = rebase(&reply.timestamps, item_count, "timestamps")?;

        for (item, code) in group.items.iter().zip(errors.iter()) {
            if *code != S_OK {
                tracing::warn!(
                    tag = %item.name,
                    error = %format_error_code(*code),
                    "read_group: per-item read error"
                );
            }
        }

        let result = ReadResult {
            names: group.items.names(),
            values: values.iter().map(value_to_text).collect(),
            raw_values: values,
            qualities,
            errors,
            timestamps,
        };
        tracing::info!(
            count = result.len(),
            errors = result.error_count(),
            "read_group completed"
        );
        Ok(result)
    }

    /// Reads the item named `tag_name`.
    ///
    /// When several groups hold the tag, the most recently created one wins;
    /// within that group the first position is used.
    pub fn read_single<P>(
        provider: &mut P,
        registry: &GroupRegistry,
        tag_name: &str,
    ) -> TagResult<ItemReading>
    where
        P: ProviderConnection + ?Sized,
    {
        let span = tracing::info_span!("tag.read_tag", tag = %tag_name);
        let _enter = span.enter();

        let (group, position) = registry
            .iter()
            .filter_map(|group| group.items.position_of(tag_name).map(|pos| (group, pos)))
            .last()
            .ok_or_else(|| TagError::TagNotFound(tag_name.to_string()))?;

        let item = group
            .items
            .get(position)
            .ok_or_else(|| TagError::Internal(format!("position {position} vanished")))?;

        tracing::debug!(group = %group.name, position, "read_tag: resolved tag");
        let reading = provider.read_item(group.handle, item.handle)?;
        tracing::info!(quality = %quality_to_string(reading.quality), "read_tag completed");
        Ok(reading)
    }

    /// Writes `value` to every item named `tag_name`, across all groups.
    ///
    /// Each write is reported on its own; a rejected write does not stop the
    /// remaining ones.
    pub fn write_single<P>(
        provider: &mut P,
        registry: &GroupRegistry,
        tag_name: &str,
        value: &OpcValue,
    ) -> TagResult<Vec<WriteResult>>
    where
        P: ProviderConnection + ?Sized,
    {
        let span = tracing::info_span!("tag.write_tag", tag = %tag_name);
        let _enter = span.enter();

        let mut results = Vec::new();
        for group in registry.iter() {
            for item in group.items.iter().filter(|item| item.name == tag_name) {
                let outcome = provider.write_item(group.handle, item.handle, value);
                let result = match outcome {
                    Ok(()) => WriteResult {
                        tag_id: tag_name.to_string(),
                        group: group.name.clone(),
                        success: true,
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(
                            group = %group.name,
                            position = item.position,
                            error = %e,
                            "write_tag: provider rejected write"
                        );
                        WriteResult {
                            tag_id: tag_name.to_string(),
                            group: group.name.clone(),
                            success: false,
                            error: Some(e.to_string()),
                        }
                    }
                };
                results.push(result);
            }
        }

        if results.is_empty() {
            return Err(TagError::TagNotFound(tag_name.to_string()));
        }
        tracing::info!(
            targets = results.len(),
            failed = results.iter().filter(|r| !r.success).count(),
            "write_tag completed"
        );
        Ok(results)
    }
}

/// Re-index a one-based reply array to zero-based, checking its length.
fn rebase<T: Clone>(
    native: &OneBasedArray<T>,
    expected: usize,
    field: &str,
) -> TagResult<Vec<T>> {
    if native.len() != expected {
        return Err(TagError::Conversion(format!(
            "batch read returned {} {field} for {expected} items",
            native.len()
        )));
    }
    (1..=expected)
        .map(|position| {
            native.get(position).cloned().ok_or_else(|| {
                TagError::Conversion(format!("{field} missing position {position}"))
            })
        })
        .collect()
}
