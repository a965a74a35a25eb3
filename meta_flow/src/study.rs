use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::Itertools;
use thiserror::Error;
use tracing::warn;

/// Columns of a study file, in the required order.
pub const STUDY_HEADER: [&str; 13] = [
    "MarkerName",
    "Strand",
    "N",
    "Effect_allele",
    "Other_allele",
    "EAF",
    "Imputation",
    "Information_type",
    "Information",
    "BETA",
    "SE",
    "P",
    "MAC",
];

const N_COLUMN: usize = 2;
const EAF_COLUMN: usize = 5;
const BETA_COLUMN: usize = 9;
const SE_COLUMN: usize = 10;
const P_COLUMN: usize = 11;

#[derive(Debug, Error)]
pub enum StudyError {
    #[error("cannot open study file '{path}': {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("study file has no header")]
    MissingHeader,

    #[error("study header does not match, expected '{expected}', found '{found}'")]
    HeaderMismatch { expected: String, found: String },

    #[error("cannot read line {line} of study file: {source}")]
    Read { line: usize, source: io::Error },

    #[error("invalid value '{value}' in column {column} on line {line}")]
    InvalidField {
        line: usize,
        column: &'static str,
        value: String,
    },
}

impl StudyError {
    /// Whether the study cannot be used at all, as opposed to failing on a particular row.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StudyError::Open { .. } | StudyError::MissingHeader | StudyError::HeaderMismatch { .. }
        )
    }
}

/// One row of a study file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantRecord {
    line: usize,
    fields: Vec<String>,
}

impl VariantRecord {
    /// Line number in the study file, starting at 1 for the header.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn marker_name(&self) -> &str {
        &self.fields[0]
    }

    pub fn strand(&self) -> &str {
        &self.fields[1]
    }

    /// Number of subjects analysed for the variant.
    pub fn n(&self) -> Result<f64, StudyError> {
        self.parse(N_COLUMN)
    }

    /// Effect allele frequency.
    pub fn eaf(&self) -> Result<f64, StudyError> {
        self.parse(EAF_COLUMN)
    }

    /// Estimated effect size.
    pub fn beta(&self) -> Result<f64, StudyError> {
        self.parse(BETA_COLUMN)
    }

    /// Standard error of the effect size estimate.
    pub fn se(&self) -> Result<f64, StudyError> {
        self.parse(SE_COLUMN)
    }

    /// Raw text of the standard error column.
    pub fn se_field(&self) -> &str {
        &self.fields[SE_COLUMN]
    }

    /// Significance of the association.
    pub fn p(&self) -> Result<f64, StudyError> {
        self.parse(P_COLUMN)
    }

    fn parse<T: FromStr>(&self, column: usize) -> Result<T, StudyError> {
        let value = &self.fields[column];
        value.parse().map_err(|_| StudyError::InvalidField {
            line: self.line,
            column: STUDY_HEADER[column],
            value: value.clone(),
        })
    }
}

/// Streaming reader of a whitespace-delimited study file.
///
/// The header is validated on construction. Rows with a wrong number of fields are skipped.
/// Fields are separated by runs of whitespace. Leading whitespace opens an empty first field,
/// so an indented row has one field too many and is skipped as malformed. Lines holding only
/// whitespace are ignored without being counted.
pub struct StudyReader<R> {
    lines: io::Lines<R>,
    line_number: usize,
    skipped_rows: usize,
}

impl StudyReader<BufReader<File>> {
    /// Open study file and validate its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StudyError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| StudyError::Open {
            path: path.to_owned(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead> StudyReader<R> {
    /// Wrap reader positioned at the header line and validate the header.
    pub fn from_reader(reader: R) -> Result<Self, StudyError> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line.map_err(|source| StudyError::Read { line: 1, source })?,
            None => return Err(StudyError::MissingHeader),
        };

        if !split_fields(&header).eq(STUDY_HEADER) {
            return Err(StudyError::HeaderMismatch {
                expected: STUDY_HEADER.join(" "),
                found: header.split_whitespace().join(" "),
            });
        }

        Ok(Self {
            lines,
            line_number: 1,
            skipped_rows: 0,
        })
    }

    /// Read next well-formed row.
    pub fn next_record(&mut self) -> Result<Option<VariantRecord>, StudyError> {
        for line in &mut self.lines {
            self.line_number += 1;
            let line = line.map_err(|source| StudyError::Read {
                line: self.line_number,
                source,
            })?;

            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<String> = split_fields(&line).map(String::from).collect();
            if fields.len() != STUDY_HEADER.len() {
                warn!(
                    line = self.line_number,
                    fields = fields.len(),
                    "Skipping row without expected number of fields"
                );
                self.skipped_rows += 1;
                continue;
            }

            return Ok(Some(VariantRecord {
                line: self.line_number,
                fields,
            }));
        }
        Ok(None)
    }

    /// Number of malformed rows skipped so far.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}

/// Whitespace-separated fields of a line, with an empty first field if the line is indented.
fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    let indent = line.starts_with(char::is_whitespace).then_some("");
    indent.into_iter().chain(line.split_whitespace())
}

impl<R: BufRead> Iterator for StudyReader<R> {
    type Item = Result<VariantRecord, StudyError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "MarkerName Strand N Effect_allele Other_allele EAF Imputation Information_type Information BETA SE P MAC";

    fn row(i: usize) -> String {
        format!("rs{i} + {} A G 0.25 1 0 0.98 0.125 0.0{i} 0.4 120", 1000 + i)
    }

    #[test]
    fn test_read_records() {
        let text = format!("{HEADER}\n{}\n{}\n", row(1), row(2));
        let records: Vec<_> = StudyReader::from_reader(text.as_bytes())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        let record = &records[1];
        assert_eq!(record.line(), 3);
        assert_eq!(record.marker_name(), "rs2");
        assert_eq!(record.strand(), "+");
        assert_eq!(record.n().unwrap(), 1002.0);
        assert_eq!(record.eaf().unwrap(), 0.25);
        assert_eq!(record.beta().unwrap(), 0.125);
        assert_eq!(record.se().unwrap(), 0.02);
        assert_eq!(record.se_field(), "0.02");
        assert_eq!(record.p().unwrap(), 0.4);
    }

    #[test]
    fn test_header_mismatch() {
        let swapped = HEADER.replace("BETA SE", "SE BETA");
        let short = HEADER.replace(" MAC", "");
        for header in [swapped, short, HEADER.to_lowercase()] {
            let text = format!("{header}\n{}\n", row(1));
            let err = StudyReader::from_reader(text.as_bytes()).err().unwrap();
            assert!(matches!(err, StudyError::HeaderMismatch { .. }));
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            StudyReader::from_reader(&b""[..]).err(),
            Some(StudyError::MissingHeader)
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let err = StudyReader::open("/nonexistent/study.txt").err().unwrap();
        assert!(matches!(err, StudyError::Open { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let mut text = format!("{HEADER}\n");
        for i in 0..100 {
            if i == 17 || i == 64 {
                text.push_str("rs0 + 1000 A G\n");
            } else {
                text.push_str(&row(i % 10));
                text.push('\n');
            }
        }

        let mut reader = StudyReader::from_reader(text.as_bytes()).unwrap();
        let count = reader.by_ref().filter_map(Result::ok).count();
        assert_eq!(count, 98);
        assert_eq!(reader.skipped_rows(), 2);
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let text = format!("{HEADER}\n\n{}\n   \n{}\n", row(1), row(2));
        let mut reader = StudyReader::from_reader(text.as_bytes()).unwrap();
        let lines: Vec<_> = reader.by_ref().map(|x| x.unwrap().line()).collect();
        assert_eq!(lines, vec![3, 5]);
        assert_eq!(reader.skipped_rows(), 0);
    }

    #[test]
    fn test_indented_rows_are_malformed() {
        let text = format!("{HEADER}\n {}\n\t{}\n{}\n", row(1), row(2), row(3));
        let mut reader = StudyReader::from_reader(text.as_bytes()).unwrap();
        let lines: Vec<_> = reader.by_ref().map(|x| x.unwrap().line()).collect();
        assert_eq!(lines, vec![4]);
        assert_eq!(reader.skipped_rows(), 2);
    }

    #[test]
    fn test_indented_header_is_rejected() {
        let text = format!(" {HEADER}\n{}\n", row(1));
        assert!(matches!(
            StudyReader::from_reader(text.as_bytes()),
            Err(StudyError::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_field() {
        let text = format!("{HEADER}\n{}\n", row(1).replace("0.01", "NA"));
        let record = StudyReader::from_reader(text.as_bytes())
            .unwrap()
            .next_record()
            .unwrap()
            .unwrap();
        match record.se() {
            Err(StudyError::InvalidField {
                line,
                column,
                value,
            }) => assert_eq!((line, column, value.as_str()), (2, "SE", "NA")),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
