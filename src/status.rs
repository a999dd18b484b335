//! Read-only frame table built from published marker snapshots.

use std::fmt;

use serde::Serialize;

use crate::marker::FrameMarker;
use crate::pose::{FrameKind, FrameRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRow {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub kind: Option<FrameKind>,
    pub position: [f64; 3],
    pub orientation: [f64; 4],
    pub axes_visible: bool,
}

impl StatusRow {
    pub fn from_marker(marker: &FrameMarker) -> Self {
        let snapshot = marker.snapshot();
        Self {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            parent_id: snapshot.parent_id.clone(),
            kind: Some(marker.kind()),
            position: snapshot.pose.position,
            orientation: snapshot.pose.orientation,
            axes_visible: marker.axes_visible(),
        }
    }

    /// Row for a record fetched straight from the engine.
    pub fn from_record(record: FrameRecord, scale: f64) -> Self {
        let snapshot = record.into_snapshot(scale);
        Self {
            id: snapshot.id,
            name: snapshot.name,
            parent_id: snapshot.parent_id,
            kind: None,
            position: snapshot.pose.position,
            orientation: snapshot.pose.orientation,
            axes_visible: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StatusTable {
    rows: Vec<StatusRow>,
}

impl StatusTable {
    pub fn new(rows: Vec<StatusRow>) -> Self {
        Self { rows }
    }

    /// Rows from the markers' published snapshots, in registration order.
    pub fn from_markers<'a>(markers: impl IntoIterator<Item = &'a FrameMarker>) -> Self {
        Self::new(markers.into_iter().map(StatusRow::from_marker).collect())
    }

    pub fn from_records(records: Vec<FrameRecord>, scale: f64) -> Self {
        Self::new(
            records
                .into_iter()
                .map(|r| StatusRow::from_record(r, scale))
                .collect(),
        )
    }

    pub fn rows(&self) -> &[StatusRow] {
        &self.rows
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn format_vec(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{:.3}", v)).collect();
    format!("({})", parts.join(", "))
}

impl fmt::Display for StatusTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = ["ID", "NAME", "PARENT", "KIND", "POSITION", "ORIENTATION"];
        let cells: Vec<[String; 6]> = self
            .rows
            .iter()
            .map(|row| {
                [
                    row.id.clone(),
                    row.name.clone(),
                    row.parent_id.clone().unwrap_or_else(|| "-".to_string()),
                    row.kind.map_or("-", |k| k.label()).to_string(),
                    format_vec(&row.position),
                    format_vec(&row.orientation),
                ]
            })
            .collect();

        let mut widths = header.map(str::len);
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let write_row = |f: &mut fmt::Formatter<'_>, row: &[&str]| -> fmt::Result {
            let padded: Vec<String> = row
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect();
            writeln!(f, "{}", padded.join("  ").trim_end())
        };

        write_row(f, &header)?;
        for row in &cells {
            let refs: Vec<&str> = row.iter().map(String::as_str).collect();
            write_row(f, &refs)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::PoseSample;

    fn record(id: &str, parent: Option<&str>, x: f64) -> FrameRecord {
        FrameRecord {
            id: id.to_string(),
            name: id.to_uppercase(),
            parent_id: parent.map(str::to_string),
            pose: PoseSample::new([x, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
        }
    }

    #[test]
    fn test_table_text() {
        let table = StatusTable::from_records(
            vec![record("eci", None, 0.0), record("ecef", Some("eci"), 1500.0)],
            1000.0,
        );
        let text = table.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID  "));
        assert!(lines[2].contains("(1.500, 0.000, 0.000)"));
        // parent column lines up under its header
        let parent_col = lines[0].find("PARENT").unwrap();
        assert_eq!(&lines[2][parent_col..parent_col + 3], "eci");
    }

    #[test]
    fn test_table_json() {
        let table = StatusTable::from_records(vec![record("eci", None, 2000.0)], 1000.0);
        let json: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["id"], "eci");
        assert_eq!(json[0]["position"][0], 2.0);
        assert!(json[0]["parent_id"].is_null());
    }
}
