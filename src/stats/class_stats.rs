use std::collections::HashMap;

use crate::geofile::feature::{FieldValue, Record};

/// Keeps classes in order of first appearance.
struct ClassIndex<T> {
    entries: Vec<(String, T)>,
    index_by_class: HashMap<String, usize>,
}

impl<T: Default> ClassIndex<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index_by_class: HashMap::new(),
        }
    }

    fn entry(&mut self, class: &str) -> &mut T {
        let index = match self.index_by_class.get(class) {
            Some(&index) => index,
            None => {
                self.index_by_class
                    .insert(class.to_owned(), self.entries.len());
                self.entries.push((class.to_owned(), T::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassAverage {
    pub class: String,
    pub mean: f64,
    pub count: usize,
}

#[derive(Default)]
struct Sum {
    total: f64,
    count: usize,
}

/// Mean of `value_field` per value of `class_field`. Records without a numeric value are skipped.
pub fn average_by_class(
    records: &[Record],
    class_field: &str,
    value_field: &str,
) -> Vec<ClassAverage> {
    let mut sums: ClassIndex<Sum> = ClassIndex::new();
    let mut skipped = 0;
    for record in records {
        let Some(value) = record.field(value_field).as_f64() else {
            skipped += 1;
            continue;
        };
        let sum = sums.entry(&record.field(class_field).to_string());
        sum.total += value;
        sum.count += 1;
    }
    if skipped > 0 {
        log::warn!(
            "Skipped {} records without a numeric '{}' value",
            skipped,
            value_field
        );
    }
    sums.entries
        .into_iter()
        .map(|(class, sum)| ClassAverage {
            class,
            mean: sum.total / sum.count as f64,
            count: sum.count,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRange {
    pub min: f64,
    pub max: f64,
}

impl Default for FieldRange {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl FieldRange {
    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRanges {
    pub class: String,
    /// One range per requested field, in the requested order.
    pub ranges: Vec<(String, FieldRange)>,
}

/// Min and max of each of `value_fields` per class.
///
/// A record only counts when its class is set and not empty and every requested field is numeric.
pub fn ranges_by_class(
    records: &[Record],
    class_field: &str,
    value_fields: &[String],
) -> Vec<ClassRanges> {
    let mut ranges: ClassIndex<Vec<FieldRange>> = ClassIndex::new();
    for record in records {
        let class = match record.field(class_field) {
            FieldValue::Null => continue,
            FieldValue::String(class) if class.is_empty() => continue,
            class => class.to_string(),
        };
        let Some(values) = value_fields
            .iter()
            .map(|field| record.field(field).as_f64())
            .collect::<Option<Vec<f64>>>()
        else {
            continue;
        };
        let class_ranges = ranges.entry(&class);
        if class_ranges.is_empty() {
            class_ranges.resize(value_fields.len(), FieldRange::default());
        }
        for (range, value) in class_ranges.iter_mut().zip(values) {
            range.include(value);
        }
    }
    ranges
        .entries
        .into_iter()
        .map(|(class, field_ranges)| ClassRanges {
            class,
            ranges: value_fields.iter().cloned().zip(field_ranges).collect(),
        })
        .collect()
}
