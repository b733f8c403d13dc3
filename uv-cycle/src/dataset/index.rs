use super::ManifestRecord;
use crate::common::*;

/// Records sharing the same source texture.
#[derive(Debug, Clone)]
pub struct SourceGroup {
    pub source_uv: PathBuf,
    pub records: Vec<Arc<ManifestRecord>>,
}

/// The position of a record inside the grouped index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupPosition {
    pub group: usize,
    pub offset: usize,
}

/// A primary record coupled with a partner of the same source texture.
#[derive(Debug, Clone)]
pub struct RecordPair {
    pub index: usize,
    pub primary: Arc<ManifestRecord>,
    pub partner: Arc<ManifestRecord>,
}

/// Indexable view over manifest records, grouped by source texture.
///
/// Groups are sorted by source path so that the index-to-record mapping
/// only depends on the manifest content.
#[derive(Debug, Clone)]
pub struct PairedViewIndex {
    groups: Vec<SourceGroup>,
    positions: Vec<GroupPosition>,
}

impl PairedViewIndex {
    pub fn new(records: impl IntoIterator<Item = ManifestRecord>) -> Result<Self> {
        let mut grouped: BTreeMap<PathBuf, Vec<Arc<ManifestRecord>>> = BTreeMap::new();
        records.into_iter().for_each(|record| {
            grouped
                .entry(record.source_uv.clone())
                .or_default()
                .push(Arc::new(record));
        });
        ensure!(!grouped.is_empty(), "cannot build an index without records");

        let groups: Vec<_> = grouped
            .into_iter()
            .map(|(source_uv, records)| SourceGroup { source_uv, records })
            .collect();
        let positions: Vec<_> = groups
            .iter()
            .enumerate()
            .flat_map(|(group, SourceGroup { records, .. })| {
                (0..records.len()).map(move |offset| GroupPosition { group, offset })
            })
            .collect();

        Ok(Self { groups, positions })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn groups(&self) -> &[SourceGroup] {
        &self.groups
    }

    /// Resolve a sample index to its group and offset in constant time.
    pub fn locate(&self, index: usize) -> Result<GroupPosition> {
        self.positions.get(index).copied().ok_or_else(|| {
            format_err!(
                "index {} is out of range for {} records",
                index,
                self.positions.len()
            )
        })
    }

    pub fn record(&self, index: usize) -> Result<&Arc<ManifestRecord>> {
        let GroupPosition { group, offset } = self.locate(index)?;
        Ok(&self.groups[group].records[offset])
    }

    /// Pick the primary record at `index` and draw a partner from its group.
    ///
    /// The partner differs from the primary whenever the group has at least
    /// two records. A single-record group pairs the record with itself.
    pub fn pair<R>(&self, index: usize, rng: &mut R) -> Result<RecordPair>
    where
        R: Rng + ?Sized,
    {
        let GroupPosition { group, offset } = self.locate(index)?;
        let records = &self.groups[group].records;

        let partner_offset = if records.len() > 1 {
            loop {
                let candidate = rng.gen_range(0..records.len());
                if candidate != offset {
                    break candidate;
                }
            }
        } else {
            offset
        };

        Ok(RecordPair {
            index,
            primary: records[offset].clone(),
            partner: records[partner_offset].clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: &str, view: &str) -> ManifestRecord {
        ManifestRecord {
            source_uv: PathBuf::from(source),
            source_view: PathBuf::from(format!("{}.view.png", source)),
            augmented_uv: PathBuf::from(format!("{}.uv.png", view)),
            augmented_view: PathBuf::from(view),
            seed: 0,
            transforms: vec![],
        }
    }

    fn sample_records() -> Vec<ManifestRecord> {
        vec![
            record("uv/b.png", "b0"),
            record("uv/a.png", "a0"),
            record("uv/c.png", "c0"),
            record("uv/a.png", "a1"),
            record("uv/b.png", "b1"),
            record("uv/a.png", "a2"),
        ]
    }

    #[test]
    fn groups_are_sorted_by_source() -> Result<()> {
        let index = PairedViewIndex::new(sample_records())?;
        let sources: Vec<_> = index
            .groups()
            .iter()
            .map(|group| group.source_uv.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(sources, vec!["uv/a.png", "uv/b.png", "uv/c.png"]);
        assert_eq!(index.len(), 6);
        assert_eq!(
            index.locate(3)?,
            GroupPosition {
                group: 1,
                offset: 0
            }
        );
        assert!(index.locate(6).is_err());
        Ok(())
    }

    #[test]
    fn indexing_is_independent_of_the_rng() -> Result<()> {
        let lhs = PairedViewIndex::new(sample_records())?;
        let rhs = PairedViewIndex::new(sample_records())?;
        let mut lhs_rng = StdRng::seed_from_u64(1);
        let mut rhs_rng = StdRng::seed_from_u64(2);

        for index in 0..lhs.len() {
            assert_eq!(lhs.locate(index)?, rhs.locate(index)?);
            let lhs_pair = lhs.pair(index, &mut lhs_rng)?;
            let rhs_pair = rhs.pair(index, &mut rhs_rng)?;
            assert_eq!(lhs_pair.primary, rhs_pair.primary);
        }
        Ok(())
    }

    #[test]
    fn partner_differs_from_primary_in_larger_groups() -> Result<()> {
        let index = PairedViewIndex::new(sample_records())?;
        let mut rng = StdRng::seed_from_u64(1337);

        for _ in 0..100 {
            for sample in 0..5 {
                let pair = index.pair(sample, &mut rng)?;
                assert_ne!(pair.primary.augmented_view, pair.partner.augmented_view);
                assert_eq!(pair.primary.source_uv, pair.partner.source_uv);
            }
        }
        Ok(())
    }

    #[test]
    fn singleton_group_pairs_with_itself() -> Result<()> {
        let index = PairedViewIndex::new(sample_records())?;
        let mut rng = StdRng::seed_from_u64(0);

        let pair = index.pair(5, &mut rng)?;
        assert!(Arc::ptr_eq(&pair.primary, &pair.partner));
        Ok(())
    }

    #[test]
    fn same_seed_draws_same_partners() -> Result<()> {
        let index = PairedViewIndex::new(sample_records())?;
        let draw = |seed| -> Result<Vec<PathBuf>> {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..index.len())
                .map(|sample| Ok(index.pair(sample, &mut rng)?.partner.augmented_view.clone()))
                .collect()
        };
        assert_eq!(draw(42)?, draw(42)?);
        Ok(())
    }
}
