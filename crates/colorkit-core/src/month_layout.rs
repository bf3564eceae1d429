//! Geometry for the month grid.
//!
//! Month cells carry no dependable per-cell dates in every locale, so columns
//! are recovered from where the day squares actually render: cluster their
//! horizontal centers, then assign weekdays by column order.

use crate::column_map::MappingUnavailable;
use crate::view::WeekStart;

/// Fewest grid cells a month grid can have (5 weeks x 7 days).
pub const MIN_MONTH_CELLS: usize = 35;

/// Share of the median column gap that still counts as "same column".
pub const CLUSTER_TOLERANCE_RATIO: f64 = 0.25;

/// Rendered box of a day square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl CellBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// A candidate `[role=grid]` element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCandidate {
    pub area: f64,
    pub gridcell_count: usize,
}

/// Index of the month grid among the candidates: the largest one that has
/// at least [`MIN_MONTH_CELLS`] gridcells.
pub fn pick_month_grid(candidates: &[GridCandidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.gridcell_count >= MIN_MONTH_CELLS)
        .max_by(|(_, a), (_, b)| a.area.total_cmp(&b.area))
        .map(|(i, _)| i)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Group cell indices into rows by vertical center.
fn rows(cells: &[CellBox]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..cells.len()).collect();
    order.sort_by(|&a, &b| cells[a].center_y().total_cmp(&cells[b].center_y()));

    let mut rows: Vec<Vec<usize>> = Vec::new();
    let mut row_y = f64::NEG_INFINITY;
    for index in order {
        let cell = &cells[index];
        let threshold = (cell.height / 2.0).max(1.0);
        match rows.last_mut() {
            Some(row) if cell.center_y() - row_y <= threshold => row.push(index),
            _ => {
                row_y = cell.center_y();
                rows.push(vec![index]);
            }
        }
    }
    rows
}

/// Median horizontal gap between neighbors in the same row.
pub fn median_column_gap(cells: &[CellBox]) -> Option<f64> {
    let mut gaps = Vec::new();
    for mut row in rows(cells) {
        row.sort_by(|&a, &b| cells[a].center_x().total_cmp(&cells[b].center_x()));
        for pair in row.windows(2) {
            let gap = cells[pair[1]].center_x() - cells[pair[0]].center_x();
            if gap > 0.0 {
                gaps.push(gap);
            }
        }
    }
    median(&mut gaps)
}

/// Cluster cells into columns by horizontal center, left to right.
///
/// The tolerance adapts to the layout: a quarter of the median same-row gap,
/// which absorbs sub-pixel jitter at any zoom level. Each returned column
/// holds indices into `cells`.
pub fn cluster_columns(cells: &[CellBox]) -> Vec<Vec<usize>> {
    if cells.is_empty() {
        return Vec::new();
    }
    let tolerance = match median_column_gap(cells) {
        Some(gap) => gap * CLUSTER_TOLERANCE_RATIO,
        // One cell per row; nothing to learn a gap from.
        None => cells[0].width.max(1.0) * CLUSTER_TOLERANCE_RATIO,
    };

    let mut order: Vec<usize> = (0..cells.len()).collect();
    order.sort_by(|&a, &b| cells[a].center_x().total_cmp(&cells[b].center_x()));

    let mut columns: Vec<(f64, Vec<usize>)> = Vec::new();
    for index in order {
        let x = cells[index].center_x();
        match columns.last_mut() {
            Some((mean, members)) if (x - *mean).abs() <= tolerance => {
                members.push(index);
                *mean += (x - *mean) / members.len() as f64;
            }
            _ => columns.push((x, vec![index])),
        }
    }
    columns.into_iter().map(|(_, members)| members).collect()
}

/// Weekday for each month column, or unavailable for counts other than 5 or 7.
pub fn month_weekdays(
    column_count: usize,
    week_start: WeekStart,
) -> Result<Vec<u8>, MappingUnavailable> {
    match column_count {
        5 => Ok(vec![1, 2, 3, 4, 5]),
        7 => {
            let offset = usize::from(week_start.offset());
            Ok((0..7).map(|c| ((c + offset) % 7) as u8).collect())
        }
        _ => Err(MappingUnavailable { column_count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A `weeks` x `days` grid of 100px squares with a 4px gap and some jitter.
    fn grid(weeks: usize, days: usize) -> Vec<CellBox> {
        let mut cells = Vec::new();
        for w in 0..weeks {
            for d in 0..days {
                let jitter = if (w + d) % 2 == 0 { 0.4 } else { -0.3 };
                cells.push(CellBox::new(
                    d as f64 * 104.0 + jitter,
                    w as f64 * 90.0,
                    100.0,
                    86.0,
                ));
            }
        }
        cells
    }

    #[test]
    fn test_pick_month_grid() {
        let candidates = [
            GridCandidate {
                area: 50_000.0,
                gridcell_count: 42,
            },
            GridCandidate {
                area: 900_000.0,
                gridcell_count: 7,
            },
            GridCandidate {
                area: 600_000.0,
                gridcell_count: 35,
            },
        ];
        assert_eq!(pick_month_grid(&candidates), Some(2));
        assert_eq!(pick_month_grid(&candidates[1..2]), None);
    }

    #[test]
    fn test_median_column_gap() {
        let gap = median_column_gap(&grid(5, 7)).unwrap();
        assert!((gap - 104.0).abs() < 1.0);
    }

    #[test]
    fn test_cluster_seven_columns_with_jitter() {
        let cells = grid(6, 7);
        let columns = cluster_columns(&cells);
        assert_eq!(columns.len(), 7);
        for (c, members) in columns.iter().enumerate() {
            assert_eq!(members.len(), 6);
            for &i in members {
                assert_eq!(i % 7, c);
            }
        }
    }

    #[test]
    fn test_cluster_five_columns() {
        assert_eq!(cluster_columns(&grid(5, 5)).len(), 5);
    }

    #[test]
    fn test_cluster_empty() {
        assert!(cluster_columns(&[]).is_empty());
    }

    #[test]
    fn test_month_weekdays() {
        assert_eq!(
            month_weekdays(7, WeekStart::Sunday).unwrap(),
            vec![0, 1, 2, 3, 4, 5, 6]
        );
        assert_eq!(
            month_weekdays(7, WeekStart::Saturday).unwrap(),
            vec![6, 0, 1, 2, 3, 4, 5]
        );
        assert_eq!(
            month_weekdays(5, WeekStart::Saturday).unwrap(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(month_weekdays(6, WeekStart::Monday).unwrap_err().column_count, 6);
    }
}
