use std::fs;
use std::path::Path;

use csv::Writer;

use crate::errors::{ContactAngleError, ErrorReport, Result};
use crate::pipeline::AngleResult;

/// Result of measuring one input file
pub enum MeasurementOutcome {
    Measured(Box<AngleResult>),
    Failed(ErrorReport),
}

pub struct MeasurementRecord {
    pub filename: String,
    pub outcome: MeasurementOutcome,
}

impl MeasurementRecord {
    pub fn new(filename: impl Into<String>, outcome: Result<AngleResult>) -> Self {
        let outcome = match outcome {
            Ok(result) => MeasurementOutcome::Measured(Box::new(result)),
            Err(e) => MeasurementOutcome::Failed(e.report()),
        };
        Self {
            filename: filename.into(),
            outcome,
        }
    }
}

const SUMMARY_HEADER: [&str; 16] = [
    "Filename",
    "Status",
    "Left_Angle_Deg",
    "Right_Angle_Deg",
    "Mean_Angle_Deg",
    "Best_Angle_Deg",
    "Best_Side",
    "Baseline_M",
    "Baseline_C",
    "Left_Contact_X",
    "Left_Contact_Y",
    "Right_Contact_X",
    "Right_Contact_Y",
    "Total_Uncertainty_Deg",
    "Confidence",
    "Message",
];

fn summary_row(record: &MeasurementRecord) -> Vec<String> {
    match &record.outcome {
        MeasurementOutcome::Measured(r) => vec![
            record.filename.clone(),
            "ok".to_string(),
            format!("{:.4}", r.left_angle_deg),
            format!("{:.4}", r.right_angle_deg),
            format!("{:.4}", r.mean_angle_deg),
            format!("{:.4}", r.best_angle_deg),
            format!("{:?}", r.best_side),
            format!("{:.6}", r.baseline.m),
            format!("{:.4}", r.baseline.c),
            format!("{:.3}", r.left_contact.x),
            format!("{:.3}", r.left_contact.y),
            format!("{:.3}", r.right_contact.x),
            format!("{:.3}", r.right_contact.y),
            format!("{:.4}", r.quality.total_uncertainty),
            format!("{:.4}", r.confidence),
            format!("{:?}", r.confidence_label),
        ],
        MeasurementOutcome::Failed(report) => {
            let mut row = vec![record.filename.clone(), format!("{:?}", report.kind)];
            row.extend(std::iter::repeat(String::new()).take(SUMMARY_HEADER.len() - 3));
            row.push(report.message.clone());
            row
        }
    }
}

/// Write one summary row per measured file
pub fn write_summary_csv<P: AsRef<Path>>(records: &[MeasurementRecord], output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(output_path)?;
    writer.write_record(SUMMARY_HEADER)?;
    for record in records {
        writer.write_record(summary_row(record))?;
    }

    writer
        .flush()
        .map_err(|e| ContactAngleError::CsvOutput(csv::Error::from(e)))?;

    Ok(())
}

/// Write the full result as `<output_dir>/json/<filename>.json`
pub fn write_result_json<P: AsRef<Path>>(result: &AngleResult, output_dir: P, filename: &str) -> Result<()> {
    let output_path = output_dir.as_ref().join("json").join(format!("{}.json", filename));

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(result)?;
    fs::write(output_path, json)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_rows_keep_the_column_count() {
        let record = MeasurementRecord::new("blank", Err(ContactAngleError::EmptyMask));
        let row = summary_row(&record);
        assert_eq!(row.len(), SUMMARY_HEADER.len());
        assert_eq!(row[1], "EmptyMask");
        assert!(row[15].contains("no foreground"));
    }

    #[test]
    fn summary_csv_has_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("contact_angle_csv_{}", std::process::id()));
        let path = dir.join("summary.csv");
        let records = vec![
            MeasurementRecord::new("a", Err(ContactAngleError::EmptyMask)),
            MeasurementRecord::new(
                "b",
                Err(ContactAngleError::InsufficientContour { found: 5, required: 20 }),
            ),
        ];
        write_summary_csv(&records, &path).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), SUMMARY_HEADER.len());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][1], "InsufficientContour");
        fs::remove_dir_all(&dir).ok();
    }
}
