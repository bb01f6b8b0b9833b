//! Pedigree file parsing and kinship role assignment
//!

use camino::Utf8Path;
use csv::{ReaderBuilder, StringRecord, Trim};
use simple_error::{SimpleResult, bail};

#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum KinshipRole {
    Parent,
    Proband,
    Offspring,
}

#[derive(Clone, Debug)]
pub struct PedigreeEntry {
    pub sample_name: String,
    pub role: KinshipRole,
}

const SAMPLE_ID_COLUMN: usize = 1;
const PATERNAL_ID_COLUMN: usize = 2;
const MATERNAL_ID_COLUMN: usize = 3;
const PHENOTYPE_COLUMN: usize = 5;

fn get_kinship_role(maternal_id: &str, paternal_id: &str, phenotype: &str) -> KinshipRole {
    if maternal_id == "0" && paternal_id == "0" {
        KinshipRole::Parent
    } else if phenotype == "affected" || phenotype == "2" {
        KinshipRole::Proband
    } else {
        KinshipRole::Offspring
    }
}

fn get_column<'a>(record: &'a StringRecord, column: usize, line_index: usize) -> SimpleResult<&'a str> {
    match record.get(column) {
        Some(x) => Ok(x),
        None => bail!(
            "Pedigree file line {} has {} columns, at least {} are required",
            line_index + 1,
            record.len(),
            PHENOTYPE_COLUMN + 1
        ),
    }
}

/// Parse pedigree records from any tab-delimited reader
///
/// Columns are family ID, sample ID, paternal ID, maternal ID, sex and phenotype. Lines starting with '#' are skipped.
///
pub fn parse_pedigree<R: std::io::Read>(reader: R) -> SimpleResult<Vec<PedigreeEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .delimiter(b'\t')
        .from_reader(reader);

    let mut entries = Vec::new();
    for (line_index, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(x) => x,
            Err(e) => bail!("Failed to parse pedigree file line {}: {}", line_index + 1, e),
        };
        let sample_name = get_column(&record, SAMPLE_ID_COLUMN, line_index)?;
        let paternal_id = get_column(&record, PATERNAL_ID_COLUMN, line_index)?;
        let maternal_id = get_column(&record, MATERNAL_ID_COLUMN, line_index)?;
        let phenotype = get_column(&record, PHENOTYPE_COLUMN, line_index)?;
        if sample_name.is_empty() {
            bail!("Empty sample ID on pedigree file line {}", line_index + 1);
        }
        if entries
            .iter()
            .any(|x: &PedigreeEntry| x.sample_name == sample_name)
        {
            bail!("Sample '{sample_name}' is repeated in pedigree file");
        }
        entries.push(PedigreeEntry {
            sample_name: sample_name.to_string(),
            role: get_kinship_role(maternal_id, paternal_id, phenotype),
        });
    }

    let parent_count = entries
        .iter()
        .filter(|x| x.role == KinshipRole::Parent)
        .count();
    if parent_count != 2 {
        bail!("Pedigree must contain exactly 2 parents, found {parent_count}");
    }
    if entries.len() < 3 {
        bail!("Pedigree must contain at least one offspring or proband");
    }
    Ok(entries)
}

pub fn read_pedigree_file(filename: &Utf8Path) -> SimpleResult<Vec<PedigreeEntry>> {
    let file = match std::fs::File::open(filename) {
        Ok(x) => x,
        Err(e) => bail!("Unable to open pedigree file '{filename}': {e}"),
    };
    parse_pedigree(file)
}

/// Precomputed sample index views for each pedigree role
///
/// Indices refer to the caller's sample order. Probands and other offspring are both children of the
/// two parents; `children` lists them in sample order.
///
#[derive(Clone, Debug)]
pub struct PedigreeIndex {
    pub parents: [usize; 2],
    pub children: Vec<usize>,
    pub probands: Vec<usize>,
}

impl PedigreeIndex {
    pub fn new(roles: &[KinshipRole]) -> SimpleResult<Self> {
        let parents = roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == KinshipRole::Parent)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        if parents.len() != 2 {
            bail!("Pedigree must contain exactly 2 parents, found {}", parents.len());
        }
        let children = roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r != KinshipRole::Parent)
            .map(|(i, _)| i)
            .collect();
        let probands = roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == KinshipRole::Proband)
            .map(|(i, _)| i)
            .collect();
        Ok(Self {
            parents: [parents[0], parents[1]],
            children,
            probands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pedigree() {
        let ped = "\
# family\tid\tpat\tmat\tsex\tphenotype
fam1\tdad\t0\t0\t1\t1
fam1\tmom\t0\t0\t2\t1
fam1\tkid1\tdad\tmom\t1\taffected
fam1\tkid2\tdad\tmom\t2\t2
fam1\tkid3\tdad\tmom\t2\t1
";
        let entries = parse_pedigree(ped.as_bytes()).unwrap();
        let roles = entries.iter().map(|x| x.role).collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![
                KinshipRole::Parent,
                KinshipRole::Parent,
                KinshipRole::Proband,
                KinshipRole::Proband,
                KinshipRole::Offspring
            ]
        );
        assert_eq!(entries[2].sample_name, "kid1");
        assert_eq!(entries[4].role.to_string(), "offspring");

        let index = PedigreeIndex::new(&roles).unwrap();
        assert_eq!(index.parents, [0, 1]);
        assert_eq!(index.children, vec![2, 3, 4]);
        assert_eq!(index.probands, vec![2, 3]);
    }

    #[test]
    fn test_parse_pedigree_errors() {
        // Only one parent:
        let ped = "fam1\tdad\t0\t0\t1\t1\nfam1\tkid1\tdad\tmom\t1\t2\n";
        assert!(parse_pedigree(ped.as_bytes()).is_err());

        // Truncated row:
        let ped = "fam1\tdad\t0\t0\t1\t1\nfam1\tmom\t0\t0\nfam1\tkid1\tdad\tmom\t1\t2\n";
        assert!(parse_pedigree(ped.as_bytes()).is_err());
    }
}
