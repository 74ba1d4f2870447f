use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::ops::Add;
use std::path::{Path, PathBuf};

use crate::errors::RegionSetError;
use crate::models::Region;
use crate::utils::get_dynamic_reader;

///
/// RegionSet struct, an ordered collection of regions that keeps track of the
/// total number of bases it covers and of the chromosomes it touches.
///
/// `cumulative_size` always equals the sum of the member widths; it is updated
/// on every insertion.
///
#[derive(Clone, Debug, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
    cumulative_size: u64,
    chroms: BTreeSet<String>,
    pub path: Option<PathBuf>,
}

impl TryFrom<&Path> for RegionSet {
    type Error = anyhow::Error;

    ///
    /// Create a new [RegionSet] from a bed file (optionally gzipped).
    ///
    /// Lines starting with `browser`, `track` or `#`, and a leading column
    /// header line, are skipped.
    fn try_from(value: &Path) -> Result<Self> {
        let reader = get_dynamic_reader(value)?;

        let mut region_set = RegionSet::new();
        let mut first_line = true;

        for line in reader.lines() {
            let line = line?;

            if line.trim().is_empty()
                || line.starts_with("browser")
                || line.starts_with("track")
                || line.starts_with('#')
            {
                first_line = false;
                continue;
            }

            // column headers like `chr start end` without a leading #
            if first_line {
                first_line = false;
                let is_header = line
                    .split_whitespace()
                    .nth(1)
                    .is_some_and(|field| field.parse::<u32>().is_err());
                if is_header {
                    continue;
                }
            }

            region_set.push(line.parse::<Region>()?);
        }

        if region_set.is_empty() {
            return Err(RegionSetError::EmptyRegionSet(value.display().to_string()).into());
        }

        region_set.path = Some(value.to_owned());
        region_set.sort();

        Ok(region_set)
    }
}

impl TryFrom<&str> for RegionSet {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        RegionSet::try_from(Path::new(value))
    }
}

impl TryFrom<PathBuf> for RegionSet {
    type Error = anyhow::Error;

    fn try_from(value: PathBuf) -> Result<Self> {
        RegionSet::try_from(value.as_path())
    }
}

impl From<Vec<Region>> for RegionSet {
    fn from(regions: Vec<Region>) -> Self {
        let mut region_set = RegionSet::new();
        for region in regions {
            region_set.push(region);
        }
        region_set
    }
}

impl FromIterator<Region> for RegionSet {
    fn from_iter<T: IntoIterator<Item = Region>>(iter: T) -> Self {
        let mut region_set = RegionSet::new();
        for region in iter {
            region_set.push(region);
        }
        region_set
    }
}

impl<'a> IntoIterator for &'a RegionSet {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

impl Add for RegionSet {
    type Output = RegionSet;

    /// Union of two region sets: members are concatenated, sizes summed and
    /// chromosome sets merged.
    fn add(mut self, other: RegionSet) -> RegionSet {
        self.cumulative_size += other.cumulative_size;
        self.chroms.extend(other.chroms);
        self.regions.extend(other.regions);
        self.path = None;
        self
    }
}

impl PartialEq for RegionSet {
    fn eq(&self, other: &Self) -> bool {
        self.regions == other.regions && self.cumulative_size == other.cumulative_size
    }
}

impl RegionSet {
    pub fn new() -> Self {
        RegionSet::default()
    }

    ///
    /// Append a region, keeping `cumulative_size` and `chroms` current.
    ///
    pub fn push(&mut self, region: Region) {
        self.cumulative_size += region.width() as u64;
        if !self.chroms.contains(&region.chr) {
            self.chroms.insert(region.chr.clone());
        }
        self.regions.push(region);
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    ///
    /// Total number of bases covered by the members.
    ///
    pub fn cumulative_size(&self) -> u64 {
        self.cumulative_size
    }

    ///
    /// Distinct chromosomes present, in lexical order.
    ///
    pub fn chroms(&self) -> &BTreeSet<String> {
        &self.chroms
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    ///
    /// Sort regions by chromosome, then start.
    ///
    pub fn sort(&mut self) {
        self.regions
            .sort_by(|a, b| a.chr.cmp(&b.chr).then_with(|| a.start.cmp(&b.start)));
    }

    ///
    /// Merge overlapping and book-ended regions. The result is sorted.
    ///
    pub fn merged(&self) -> RegionSet {
        let mut sorted = self.regions.clone();
        sorted.sort_by(|a, b| a.chr.cmp(&b.chr).then_with(|| a.start.cmp(&b.start)));

        let mut merged: Vec<Region> = Vec::with_capacity(sorted.len());
        for region in sorted {
            match merged.last_mut() {
                Some(last) if last.touches(&region) => {
                    last.end = last.end.max(region.end);
                }
                _ => merged.push(region),
            }
        }

        let mut result = RegionSet::from(merged);
        result.path = self.path.clone();
        result
    }

    ///
    /// Remove every base covered by `excluded`, splitting members where needed.
    ///
    pub fn subtract(&self, excluded: &RegionSet) -> RegionSet {
        let excluded = excluded.merged();
        let mut blocked: HashMap<&str, Vec<(u32, u32)>> = HashMap::new();
        for region in excluded.regions.iter() {
            blocked
                .entry(region.chr.as_str())
                .or_default()
                .push((region.start, region.end));
        }

        let mut result = RegionSet::new();
        for region in &self.regions {
            let Some(intervals) = blocked.get(region.chr.as_str()) else {
                result.push(region.clone());
                continue;
            };

            let mut cursor = region.start;
            for &(start, end) in intervals {
                if end <= cursor || start >= region.end {
                    continue;
                }
                if start > cursor {
                    result.push(Region {
                        chr: region.chr.clone(),
                        start: cursor,
                        end: start,
                    });
                }
                cursor = cursor.max(end);
                if cursor >= region.end {
                    break;
                }
            }
            if cursor < region.end {
                result.push(Region {
                    chr: region.chr.clone(),
                    start: cursor,
                    end: region.end,
                });
            }
        }
        result.path = self.path.clone();
        result
    }

    ///
    /// Restrict regions to known chromosomes and clip them to the chromosome
    /// length. Returns the clipped set and the names of chromosomes that were
    /// dropped because they have no known length.
    ///
    pub fn clip_to_chrom_sizes(&self, chrom_sizes: &HashMap<String, u32>) -> (RegionSet, Vec<String>) {
        let mut result = RegionSet::new();
        let mut missing: BTreeSet<String> = BTreeSet::new();

        for region in &self.regions {
            match chrom_sizes.get(&region.chr) {
                Some(&length) => {
                    let end = region.end.min(length);
                    if end > region.start {
                        result.push(Region {
                            chr: region.chr.clone(),
                            start: region.start,
                            end,
                        });
                    }
                }
                None => {
                    missing.insert(region.chr.clone());
                }
            }
        }

        result.path = self.path.clone();
        (result, missing.into_iter().collect())
    }

    ///
    /// Save a regionset to disk as bed file
    ///
    /// # Arguments
    /// - path: the path to the file to dump to
    pub fn to_bed<T: AsRef<Path>>(&self, path: T) -> std::io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = BufWriter::new(File::create(path)?);

        for region in &self.regions {
            writeln!(file, "{}", region.as_string())?;
        }
        file.flush()
    }
}

impl Display for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegionSet with {} regions ({} bp).",
            self.len(),
            self.cumulative_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::Write;

    fn region(chr: &str, start: u32, end: u32) -> Region {
        Region::new(chr, start, end).unwrap()
    }

    #[fixture]
    fn bed_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".bed").tempfile().unwrap();
        writeln!(file, "track name=test").unwrap();
        writeln!(file, "chr2\t100\t200").unwrap();
        writeln!(file, "chr1\t500\t1500\tpeak").unwrap();
        writeln!(file, "chr1\t0\t100").unwrap();
        file.flush().unwrap();
        file
    }

    #[rstest]
    fn test_open_from_path(bed_file: tempfile::NamedTempFile) {
        let region_set = RegionSet::try_from(bed_file.path()).unwrap();

        assert_eq!(region_set.len(), 3);
        assert_eq!(region_set.cumulative_size(), 1200);
        assert_eq!(region_set.regions()[0], region("chr1", 0, 100));
        assert_eq!(region_set.regions()[2], region("chr2", 100, 200));
        assert_eq!(region_set.path.as_deref(), Some(bed_file.path()));
    }

    #[rstest]
    fn test_open_bed_gz() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.bed.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        writeln!(encoder, "chr1\t10\t20").unwrap();
        encoder.finish().unwrap();

        let region_set = RegionSet::try_from(path.as_path()).unwrap();
        assert_eq!(region_set.regions(), &[region("chr1", 10, 20)]);
    }

    #[rstest]
    fn test_open_empty_file_fails() {
        let file = tempfile::Builder::new().suffix(".bed").tempfile().unwrap();
        assert!(RegionSet::try_from(file.path()).is_err());
    }

    #[rstest]
    fn test_cumulative_size_tracks_pushes() {
        let mut region_set = RegionSet::new();
        region_set.push(region("chr1", 0, 10));
        region_set.push(region("chr1", 20, 25));
        region_set.push(region("chrX", 5, 7));

        assert_eq!(region_set.cumulative_size(), 17);
        assert_eq!(
            region_set.chroms().iter().cloned().collect::<Vec<_>>(),
            vec!["chr1".to_string(), "chrX".to_string()]
        );
    }

    #[rstest]
    fn test_union() {
        let a = RegionSet::from(vec![region("chr1", 0, 10)]);
        let b = RegionSet::from(vec![region("chr2", 0, 5), region("chr1", 50, 60)]);

        let union = a + b;
        assert_eq!(union.len(), 3);
        assert_eq!(union.cumulative_size(), 25);
        assert_eq!(union.chroms().len(), 2);
    }

    #[rstest]
    fn test_merged() {
        let region_set = RegionSet::from(vec![
            region("chr1", 50, 80),
            region("chr1", 0, 10),
            region("chr1", 10, 20),
            region("chr1", 70, 100),
            region("chr2", 0, 10),
        ]);

        let merged = region_set.merged();
        assert_eq!(
            merged.regions(),
            &[
                region("chr1", 0, 20),
                region("chr1", 50, 100),
                region("chr2", 0, 10)
            ]
        );
        assert_eq!(merged.cumulative_size(), 80);
    }

    #[rstest]
    fn test_subtract() {
        let region_set = RegionSet::from(vec![region("chr1", 0, 100), region("chr2", 0, 50)]);
        let blacklist = RegionSet::from(vec![
            region("chr1", 10, 20),
            region("chr1", 15, 30),
            region("chr1", 90, 150),
            region("chr3", 0, 10),
        ]);

        let result = region_set.subtract(&blacklist);
        assert_eq!(
            result.regions(),
            &[
                region("chr1", 0, 10),
                region("chr1", 30, 90),
                region("chr2", 0, 50)
            ]
        );
        assert_eq!(result.cumulative_size(), 120);
    }

    #[rstest]
    fn test_subtract_unsorted_blacklist() {
        let region_set = RegionSet::from(vec![region("chr1", 0, 100)]);
        let blacklist = RegionSet::from(vec![
            region("chr1", 60, 70),
            region("chr1", 5, 10),
            region("chr1", 65, 80),
        ]);

        assert_eq!(
            region_set.subtract(&blacklist).regions(),
            &[region("chr1", 0, 5), region("chr1", 10, 60), region("chr1", 80, 100)]
        );
    }

    #[rstest]
    fn test_subtract_everything() {
        let region_set = RegionSet::from(vec![region("chr1", 10, 20)]);
        let blacklist = RegionSet::from(vec![region("chr1", 0, 100)]);
        assert!(region_set.subtract(&blacklist).is_empty());
    }

    #[rstest]
    fn test_clip_to_chrom_sizes() {
        let region_set = RegionSet::from(vec![
            region("chr1", 0, 100),
            region("chr1", 90, 200),
            region("chr1", 150, 200),
            region("chrUn", 0, 10),
        ]);
        let chrom_sizes = HashMap::from([("chr1".to_string(), 120)]);

        let (clipped, missing) = region_set.clip_to_chrom_sizes(&chrom_sizes);
        assert_eq!(
            clipped.regions(),
            &[region("chr1", 0, 100), region("chr1", 90, 120)]
        );
        assert_eq!(missing, vec!["chrUn".to_string()]);
    }

    #[rstest]
    fn test_save_bed(bed_file: tempfile::NamedTempFile) {
        let region_set = RegionSet::try_from(bed_file.path()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/regions.bed");

        region_set.to_bed(&path).unwrap();

        let reread = RegionSet::try_from(path.as_path()).unwrap();
        assert_eq!(reread, region_set);
    }
}
