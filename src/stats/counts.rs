use std::{collections::HashMap, path::Path};

use anyhow::Context;

use crate::geofile::feature::Record;

#[derive(Debug, Clone, PartialEq)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Count occurrences of each value of `field`, in order of first appearance.
/// Missing values count as `NULL`.
pub fn count_field_values(records: &[Record], field: &str) -> Vec<ValueCount> {
    let mut counts: Vec<ValueCount> = Vec::new();
    let mut index_by_value: HashMap<String, usize> = HashMap::new();
    for record in records {
        let value = record.field(field).to_string();
        match index_by_value.get(&value) {
            Some(&index) => counts[index].count += 1,
            None => {
                index_by_value.insert(value.clone(), counts.len());
                counts.push(ValueCount { value, count: 1 });
            }
        }
    }
    counts
}

pub fn write_counts_to_csv(
    counts: &[ValueCount],
    value_header: &str,
    output_filepath: &Path,
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(output_filepath)
        .with_context(|| format!("Creating CSV file {:?}", output_filepath))?;
    writer.write_record([value_header, "Count"])?;
    for value_count in counts {
        writer.write_record([value_count.value.as_str(), value_count.count.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
