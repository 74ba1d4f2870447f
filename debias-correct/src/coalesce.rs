use debias_io::CorrectedRecord;

///
/// Run-length encode per-base values. `positions` must be strictly
/// increasing; a record covers a run of adjacent positions sharing one value.
/// With `region_end` set, no record extends past it.
///
pub fn coalesce(positions: &[u32], values: &[f32], region_end: Option<u32>) -> Vec<CorrectedRecord> {
    let mut records: Vec<CorrectedRecord> = Vec::new();

    for (&position, &value) in positions.iter().zip(values) {
        match records.last_mut() {
            Some(last) if last.end == position && last.value == value => last.end = position + 1,
            _ => records.push(CorrectedRecord::new(position, position + 1, value)),
        }
    }

    if let (Some(end), Some(last)) = (region_end, records.last_mut()) {
        last.end = last.end.min(end);
    }

    records
}
