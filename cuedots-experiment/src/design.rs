//! Trial design input.
//!
//! The design is produced offline (counterbalancing lives elsewhere) and is
//! read here row by row, in file order, exactly once.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use cuedots_core::{Shape, TrialSpec};
use serde::Deserialize;

pub const REQUIRED_COLUMNS: [&str; 11] = [
    "sub",
    "block",
    "trial",
    "direction",
    "hue",
    "chroma",
    "lightness",
    "shape",
    "r",
    "g",
    "b",
];

#[derive(Debug, thiserror::Error)]
pub enum DesignError {
    #[error("could not open design {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("design is missing required column {0:?}")]
    MissingColumn(&'static str),

    #[error("malformed design row")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct DesignRow {
    sub: u32,
    block: u32,
    trial: u32,
    direction: f64,
    hue: f64,
    chroma: f64,
    lightness: f64,
    shape: Shape,
    r: u8,
    g: u8,
    b: u8,
}

impl From<DesignRow> for TrialSpec {
    fn from(row: DesignRow) -> Self {
        TrialSpec {
            subject: row.sub,
            block: row.block,
            trial: row.trial,
            direction: row.direction,
            hue: row.hue,
            chroma: row.chroma,
            lightness: row.lightness,
            shape: row.shape,
            rgb: [row.r, row.g, row.b],
        }
    }
}

/// Design rows from a CSV file, optionally restricted to one subject.
/// Extra columns (repetition, group, observation, ...) are ignored.
pub struct CsvDesign<R: Read> {
    rows: csv::DeserializeRecordsIntoIter<R, DesignRow>,
    subject: Option<u32>,
}

impl CsvDesign<File> {
    pub fn open(path: impl AsRef<Path>, subject: Option<u32>) -> Result<Self, DesignError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DesignError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, subject)
    }
}

impl<R: Read> CsvDesign<R> {
    /// Checks the header row up front so a missing column fails before any
    /// trial is shown.
    pub fn from_reader(reader: R, subject: Option<u32>) -> Result<Self, DesignError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader.headers()?;
        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|column| !headers.iter().any(|h| h == **column))
        {
            return Err(DesignError::MissingColumn(*missing));
        }

        Ok(Self {
            rows: reader.into_deserialize(),
            subject,
        })
    }
}

impl<R: Read> Iterator for CsvDesign<R> {
    type Item = Result<TrialSpec, DesignError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let spec = match self.rows.next()? {
                Ok(row) => TrialSpec::from(row),
                Err(err) => return Some(Err(err.into())),
            };
            if self.subject.is_none_or(|sub| sub == spec.subject) {
                return Some(Ok(spec));
            }
        }
    }
}

/// Wraps already-built specs in the shape the session consumes.
pub fn in_memory(
    specs: impl IntoIterator<Item = TrialSpec>,
) -> impl Iterator<Item = Result<TrialSpec, DesignError>> {
    specs.into_iter().map(Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DESIGN: &str = "\
sub,repetition,direction,hue,chroma,lightness,shape,group,observation,block,trial,r,g,b
1,0,30,0,15,90,cross,even,3,0,0,240,200,210
1,0,-60,120,15,90,triangle,even,7,0,1,190,230,200
2,0,5,85,15,90,fleur,hard,1,0,0,220,225,180
1,0,0,90,15,90,circle,even,0,1,0,200,230,190
";

    #[test]
    fn rows_become_specs_in_file_order() {
        let specs: Vec<_> = CsvDesign::from_reader(DESIGN.as_bytes(), None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0].shape, Shape::Cross);
        assert_eq!(specs[0].direction, 30.0);
        assert_eq!(specs[0].rgb, [240, 200, 210]);
        assert_eq!(specs[3].block, 1);
    }

    #[test]
    fn subject_filter_skips_other_rows() {
        let specs: Vec<_> = CsvDesign::from_reader(DESIGN.as_bytes(), Some(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(specs.len(), 3);
        assert!(specs.iter().all(|s| s.subject == 1));
    }

    #[test]
    fn missing_column_fails_construction() {
        let csv = "sub,block,trial,direction,hue,chroma,lightness,shape,r,g\n";
        let err = CsvDesign::from_reader(csv.as_bytes(), None).err().unwrap();
        assert!(matches!(err, DesignError::MissingColumn("b")));
    }

    #[test]
    fn bad_shape_is_a_row_error() {
        let csv = "sub,block,trial,direction,hue,chroma,lightness,shape,r,g,b\n\
                   1,0,0,0,0,15,90,square,0,0,0\n";
        let mut design = CsvDesign::from_reader(csv.as_bytes(), None).unwrap();
        assert!(matches!(design.next(), Some(Err(DesignError::Csv(_)))));
    }

    #[test]
    fn shape_names_are_case_insensitive() {
        let csv = "sub,block,trial,direction,hue,chroma,lightness,shape,r,g,b\n\
                   1,0,0,0,0,15,90,Cross,0,0,0\n\
                   1,0,1,0,0,15,90,TRIANGLE,0,0,0\n";
        let shapes: Vec<_> = CsvDesign::from_reader(csv.as_bytes(), None)
            .unwrap()
            .map(|spec| spec.unwrap().shape)
            .collect();
        assert_eq!(shapes, vec![Shape::Cross, Shape::Triangle]);
    }

    #[test]
    fn opens_files_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DESIGN.as_bytes()).unwrap();
        let design = CsvDesign::open(file.path(), Some(2)).unwrap();
        assert_eq!(design.count(), 1);
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = CsvDesign::open("/nonexistent/design.csv", None).err().unwrap();
        assert!(err.to_string().contains("/nonexistent/design.csv"));
    }
}
