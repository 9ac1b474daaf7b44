//! DWARF line-program helpers.
//!
//! `addr2line` reports file, line and column for an address but drops the
//! discriminator of the matching row, so the discriminator ranges are read
//! straight from the line programs with `gimli`.
//!
//! The table covers every unit's line program, not just the units a batch
//! touches. It is built on the first lookup that needs a discriminator and
//! only for images whose results carry a file, but on large binaries that
//! first build walks all of `.debug_line`.

use gimli::Reader;

/// Half-open address range whose line rows carry a non-zero discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DiscriminatorRange
{
    start: u64,
    end: u64,
    discriminator: u32,
}

/// Discriminator lookup built from every unit's line program.
#[derive(Debug, Default)]
pub(crate) struct DiscriminatorTable
{
    ranges: Vec<DiscriminatorRange>,
}

impl DiscriminatorTable
{
    /// Walk every line program in `dwarf`.
    ///
    /// Units whose header or line program cannot be parsed are skipped; a
    /// discriminator is auxiliary data and never fails a lookup.
    pub(crate) fn build<R: Reader<Offset = usize>>(dwarf: &gimli::Dwarf<R>) -> Self
    {
        let mut ranges = Vec::new();
        let mut units = dwarf.units();
        loop {
            let header = match units.next() {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!("stopping discriminator scan: {err}");
                    break;
                }
            };
            let unit = match dwarf.unit(header) {
                Ok(unit) => unit,
                Err(err) => {
                    tracing::debug!("skipping unit in discriminator scan: {err}");
                    continue;
                }
            };
            let Some(program) = unit.line_program.clone() else {
                continue;
            };
            if let Err(err) = collect_rows(program, &mut ranges) {
                tracing::debug!("line program truncated: {err}");
            }
        }

        ranges.sort_by_key(|range| range.start);
        Self { ranges }
    }

    /// Discriminator of the row covering `address`, `0` if none does.
    pub(crate) fn lookup(&self, address: u64) -> u32
    {
        let idx = self.ranges.partition_point(|range| range.start <= address);
        idx.checked_sub(1)
            .and_then(|i| self.ranges.get(i))
            .filter(|range| address < range.end)
            .map_or(0, |range| range.discriminator)
    }

    #[cfg(test)]
    fn from_ranges(ranges: &[(u64, u64, u32)]) -> Self
    {
        let mut ranges: Vec<_> = ranges
            .iter()
            .map(|&(start, end, discriminator)| DiscriminatorRange {
                start,
                end,
                discriminator,
            })
            .collect();
        ranges.sort_by_key(|range| range.start);
        Self { ranges }
    }
}

fn collect_rows<R: Reader<Offset = usize>>(
    program: gimli::IncompleteLineProgram<R>,
    ranges: &mut Vec<DiscriminatorRange>,
) -> gimli::Result<()>
{
    let mut rows = program.rows();
    // Row currently in effect: (start address, discriminator).
    let mut open: Option<(u64, u32)> = None;

    while let Some((_, row)) = rows.next_row()? {
        let address = row.address();
        if let Some((start, discriminator)) = open.take() {
            if discriminator != 0 && address > start {
                ranges.push(DiscriminatorRange {
                    start,
                    end: address,
                    discriminator,
                });
            }
        }
        if !row.end_sequence() {
            let discriminator = u32::try_from(row.discriminator()).unwrap_or(u32::MAX);
            open = Some((address, discriminator));
        }
    }

    Ok(())
}
