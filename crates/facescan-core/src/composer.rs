//! Moving regions between parent and child coordinate spaces, and grouping
//! overlapping detection candidates.

use crate::buffer::{BufferError, PixelBuffer};
use crate::types::{Offset, Region};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("region {region} out of bounds: {reason}")]
    RegionOutOfBounds { region: Region, reason: String },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Move child regions into their parent's coordinate space.
///
/// Width and height are unchanged. An origin pushed below zero (or past
/// `i32::MAX`) is rejected rather than clamped.
pub fn translate(children: &[Region], offset: Offset) -> Result<Vec<Region>, ComposeError> {
    children
        .iter()
        .map(|child| {
            let x = child.x.checked_add(offset.dx);
            let y = child.y.checked_add(offset.dy);
            match (x, y) {
                (Some(x), Some(y)) if x >= 0 && y >= 0 => {
                    Ok(Region::new(x, y, child.width, child.height))
                }
                _ => Err(ComposeError::RegionOutOfBounds {
                    region: *child,
                    reason: format!("translation by ({}, {}) leaves the parent", offset.dx, offset.dy),
                }),
            }
        })
        .collect()
}

/// Copy the sub-buffer covered by `region`.
///
/// The region must lie entirely inside the buffer; callers intersect with
/// the buffer bounds first (see [`intersect`]) so that detection coordinates
/// stay exact for the translation back.
pub fn crop(buffer: &PixelBuffer, region: &Region) -> Result<PixelBuffer, ComposeError> {
    buffer.ensure_supported()?;
    let (bw, bh) = (buffer.width() as i64, buffer.height() as i64);
    if region.is_degenerate()
        || region.x < 0
        || region.y < 0
        || region.right() > bw
        || region.bottom() > bh
    {
        return Err(ComposeError::RegionOutOfBounds {
            region: *region,
            reason: format!("buffer is {bw}x{bh}"),
        });
    }

    let c = buffer.channels() as usize;
    let stride = buffer.width() as usize * c;
    let row_len = region.width as usize * c;
    let mut data = Vec::with_capacity(row_len * region.height as usize);
    for y in region.y as usize..region.bottom() as usize {
        let start = y * stride + region.x as usize * c;
        data.extend_from_slice(&buffer.data()[start..start + row_len]);
    }

    Ok(PixelBuffer::new(
        data,
        region.width as u32,
        region.height as u32,
        buffer.channels(),
    )?)
}

/// Part of `region` inside a `width × height` buffer, or `None` if disjoint.
pub fn intersect(region: &Region, width: u32, height: u32) -> Option<Region> {
    let x1 = region.x.max(0) as i64;
    let y1 = region.y.max(0) as i64;
    let x2 = region.right().min(width as i64);
    let y2 = region.bottom().min(height as i64);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Region::new(
        x1 as i32,
        y1 as i32,
        (x2 - x1) as i32,
        (y2 - y1) as i32,
    ))
}

/// Collapse overlapping raw detections into averaged candidates.
///
/// Candidates are clustered with the edge-similarity predicate (every edge
/// within `eps` times the mean of the smaller width and height), clusters
/// with fewer than `min_neighbors` members are dropped, and each survivor is
/// averaged. Output follows the order in which clusters first appear.
pub fn group_rectangles(candidates: &[Region], min_neighbors: u32, eps: f32) -> Vec<Region> {
    let n = candidates.len();
    if n == 0 {
        return Vec::new();
    }

    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&candidates[i], &candidates[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    // (sum_x, sum_y, sum_w, sum_h, count) per cluster, in first-appearance order
    let mut cluster_of_root: Vec<Option<usize>> = vec![None; n];
    let mut sums: Vec<[i64; 5]> = Vec::new();
    for (i, r) in candidates.iter().enumerate() {
        let root = find(&mut parent, i);
        let idx = *cluster_of_root[root].get_or_insert_with(|| {
            sums.push([0; 5]);
            sums.len() - 1
        });
        let s = &mut sums[idx];
        s[0] += r.x as i64;
        s[1] += r.y as i64;
        s[2] += r.width as i64;
        s[3] += r.height as i64;
        s[4] += 1;
    }

    sums.into_iter()
        .filter(|s| s[4] >= min_neighbors as i64)
        .map(|[sx, sy, sw, sh, count]| {
            let avg = |v: i64| ((v + count / 2).div_euclid(count)) as i32;
            Region::new(avg(sx), avg(sy), avg(sw), avg(sh))
        })
        .collect()
}

fn similar(a: &Region, b: &Region, eps: f32) -> bool {
    let delta = eps * (a.width.min(b.width) as i64 + a.height.min(b.height) as i64) as f32 * 0.5;
    (a.x as i64 - b.x as i64).abs() as f32 <= delta
        && (a.y as i64 - b.y as i64).abs() as f32 <= delta
        && (a.right() - b.right()).abs() as f32 <= delta
        && (a.bottom() - b.bottom()).abs() as f32 <= delta
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_inverse_is_identity() {
        let regions = vec![Region::new(3, 4, 10, 12), Region::new(0, 0, 5, 5)];
        let offset = Offset { dx: 150, dy: 120 };
        let moved = translate(&regions, offset).unwrap();
        assert_eq!(moved[0], Region::new(153, 124, 10, 12));
        let back = translate(&moved, -offset).unwrap();
        assert_eq!(back, regions);
    }

    #[test]
    fn test_translate_rejects_negative_origin() {
        let err = translate(&[Region::new(5, 5, 2, 2)], Offset { dx: -6, dy: 0 }).unwrap_err();
        assert!(matches!(err, ComposeError::RegionOutOfBounds { .. }));
    }

    #[test]
    fn test_crop_extracts_exact_pixels() {
        // 4x3 gray ramp: value = y * 4 + x
        let buf = PixelBuffer::new((0..12).collect(), 4, 3, 1).unwrap();
        let sub = crop(&buf, &Region::new(1, 1, 2, 2)).unwrap();
        assert_eq!((sub.width(), sub.height()), (2, 2));
        assert_eq!(sub.data(), &[5, 6, 9, 10]);
    }

    #[test]
    fn test_crop_rgb() {
        let buf = PixelBuffer::new((0..24).collect(), 4, 2, 3).unwrap();
        let sub = crop(&buf, &Region::new(3, 1, 1, 1)).unwrap();
        assert_eq!(sub.data(), &[21, 22, 23]);
    }

    #[test]
    fn test_crop_out_of_bounds_is_error() {
        let buf = PixelBuffer::filled(10, 10, &[0]).unwrap();
        for region in [
            Region::new(5, 5, 6, 2),
            Region::new(-1, 0, 3, 3),
            Region::new(0, 8, 3, 3),
            Region::new(2, 2, 0, 3),
        ] {
            assert!(
                matches!(crop(&buf, &region), Err(ComposeError::RegionOutOfBounds { .. })),
                "{region} should be rejected"
            );
        }
    }

    #[test]
    fn test_crop_and_intersect_near_i32_max() {
        let buf = PixelBuffer::filled(10, 10, &[0]).unwrap();
        let far = Region::new(i32::MAX - 5, 0, 100, 4);
        assert!(matches!(crop(&buf, &far), Err(ComposeError::RegionOutOfBounds { .. })));
        assert_eq!(intersect(&far, 10, 10), None);

        let tall = Region::new(0, i32::MAX - 1, 4, i32::MAX);
        assert!(matches!(crop(&buf, &tall), Err(ComposeError::RegionOutOfBounds { .. })));
        assert_eq!(intersect(&tall, 10, 10), None);
        assert_eq!(tall.bottom(), 2 * i32::MAX as i64 - 1);
    }

    #[test]
    fn test_intersect() {
        assert_eq!(
            intersect(&Region::new(-5, 8, 10, 10), 20, 12),
            Some(Region::new(0, 8, 5, 4))
        );
        assert_eq!(intersect(&Region::new(30, 0, 5, 5), 20, 20), None);
        assert_eq!(
            intersect(&Region::new(2, 2, 3, 3), 20, 20),
            Some(Region::new(2, 2, 3, 3))
        );
    }

    #[test]
    fn test_group_averages_cluster() {
        let candidates = vec![
            Region::new(100, 100, 50, 50),
            Region::new(102, 98, 50, 50),
            Region::new(98, 102, 50, 50),
            Region::new(400, 400, 20, 20),
        ];
        let grouped = group_rectangles(&candidates, 3, 0.2);
        assert_eq!(grouped, vec![Region::new(100, 100, 50, 50)]);
    }

    #[test]
    fn test_group_keeps_first_appearance_order() {
        let candidates = vec![
            Region::new(300, 300, 40, 40),
            Region::new(10, 10, 40, 40),
            Region::new(301, 301, 40, 40),
            Region::new(11, 11, 40, 40),
        ];
        let grouped = group_rectangles(&candidates, 2, 0.2);
        assert_eq!(grouped.len(), 2);
        assert!(grouped[0].x > 200);
        assert!(grouped[1].x < 50);
    }

    #[test]
    fn test_group_count_non_increasing_with_min_neighbors() {
        let mut candidates = Vec::new();
        for i in 0..6 {
            candidates.push(Region::new(50 + i, 50, 40, 40));
        }
        for i in 0..3 {
            candidates.push(Region::new(200, 200 + i, 30, 30));
        }
        candidates.push(Region::new(400, 10, 25, 25));

        let mut previous = usize::MAX;
        for k in 1..=8 {
            let count = group_rectangles(&candidates, k, 0.2).len();
            assert!(count <= previous, "min_neighbors={k}: {count} > {previous}");
            previous = count;
        }
        assert_eq!(group_rectangles(&candidates, 1, 0.2).len(), 3);
        assert_eq!(group_rectangles(&candidates, 4, 0.2).len(), 1);
        assert!(group_rectangles(&candidates, 7, 0.2).is_empty());
    }

    #[test]
    fn test_group_empty() {
        assert!(group_rectangles(&[], 1, 0.2).is_empty());
    }
}
