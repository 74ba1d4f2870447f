use crate::models::{Region, RegionSet};

///
/// Split every region into consecutive bins of `bin_size` bases. The last bin
/// of a region is clipped to the region end.
///
pub fn divide_genome(regions: &RegionSet, bin_size: u32) -> Vec<Region> {
    let bin_size = bin_size.max(1);
    let mut bins = Vec::new();

    for region in regions.iter() {
        let mut start = region.start;
        while start < region.end {
            let end = start.saturating_add(bin_size).min(region.end);
            bins.push(Region {
                chr: region.chr.clone(),
                start,
                end,
            });
            start = end;
        }
    }

    bins
}

///
/// Split `items` into `sections` contiguous chunks whose lengths differ by at
/// most one; the first `len % sections` chunks get the extra item. Chunks may
/// be empty when there are more sections than items.
///
pub fn array_split<T>(items: &[T], sections: usize) -> Vec<&[T]> {
    let sections = sections.max(1);
    let base = items.len() / sections;
    let extra = items.len() % sections;

    let mut chunks = Vec::with_capacity(sections);
    let mut offset = 0;
    for i in 0..sections {
        let size = base + usize::from(i < extra);
        chunks.push(&items[offset..offset + size]);
        offset += size;
    }

    chunks
}
