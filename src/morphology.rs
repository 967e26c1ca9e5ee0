use std::collections::VecDeque;

use crate::image_utils::{in_bounds, BinaryMask};

/// 8-connected neighbour offsets
static MOORE_NEIGHBORHOOD: [(i64, i64); 8] = [
    (1, 0),   // right
    (1, 1),   // down-right
    (0, 1),   // down
    (-1, 1),  // down-left
    (-1, 0),  // left
    (-1, -1), // up-left
    (0, -1),  // up
    (1, -1),  // up-right
];

/// 4-connected neighbour offsets
pub static VON_NEUMANN_NEIGHBORHOOD: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Offsets of a disk-shaped structuring element of the given radius
pub fn disk_offsets(radius: u32) -> Vec<(i64, i64)> {
    let r = radius as i64;
    let radius_sq = (radius as f64 + 1e-6).powi(2);
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if ((dx * dx + dy * dy) as f64) <= radius_sq {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Morphological erosion; out-of-bounds counts as background
pub fn erode(mask: &BinaryMask, radius: u32) -> BinaryMask {
    if radius == 0 {
        return mask.clone();
    }
    let kernel = disk_offsets(radius);
    let mut result = BinaryMask::new(mask.width, mask.height);
    for y in 0..mask.height {
        for x in 0..mask.width {
            if !mask.is_set(x, y) {
                continue;
            }
            let keep = kernel
                .iter()
                .all(|&(dx, dy)| mask.is_set_i(x as i64 + dx, y as i64 + dy));
            result.set(x, y, keep);
        }
    }
    result
}

/// Morphological dilation
pub fn dilate(mask: &BinaryMask, radius: u32) -> BinaryMask {
    if radius == 0 {
        return mask.clone();
    }
    let kernel = disk_offsets(radius);
    let mut result = BinaryMask::new(mask.width, mask.height);
    for y in 0..mask.height {
        for x in 0..mask.width {
            if !mask.is_set(x, y) {
                continue;
            }
            for &(dx, dy) in &kernel {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                if in_bounds(nx, ny, mask.width, mask.height) {
                    result.set(nx as usize, ny as usize, true);
                }
            }
        }
    }
    result
}

/// Closing (dilate then erode) merges gaps along the droplet edge
pub fn apply_closing(mask: &BinaryMask, radius: u32) -> BinaryMask {
    erode(&dilate(mask, radius), radius)
}

/// Opening (erode then dilate) removes speckle
pub fn apply_opening(mask: &BinaryMask, radius: u32) -> BinaryMask {
    dilate(&erode(mask, radius), radius)
}

/// Keep only the largest 8-connected foreground component.
/// Returns the filtered mask and the component's pixel count.
pub fn largest_component(mask: &BinaryMask) -> (BinaryMask, usize) {
    let (width, height) = (mask.width, mask.height);
    let mut labels = vec![0u32; width * height];
    let mut next_label = 0u32;
    let mut best_label = 0u32;
    let mut best_size = 0usize;
    let mut queue = VecDeque::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let start = start_y * width + start_x;
            if !mask.is_set(start_x, start_y) || labels[start] != 0 {
                continue;
            }
            next_label += 1;
            labels[start] = next_label;
            queue.push_back((start_x, start_y));
            let mut size = 0usize;

            while let Some((x, y)) = queue.pop_front() {
                size += 1;
                for &(dx, dy) in &MOORE_NEIGHBORHOOD {
                    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                    if !mask.is_set_i(nx, ny) {
                        continue;
                    }
                    let idx = ny as usize * width + nx as usize;
                    if labels[idx] == 0 {
                        labels[idx] = next_label;
                        queue.push_back((nx as usize, ny as usize));
                    }
                }
            }

            if size > best_size {
                best_size = size;
                best_label = next_label;
            }
        }
    }

    let mut result = BinaryMask::new(width, height);
    if best_size > 0 {
        for (dst, &label) in result.data.iter_mut().zip(labels.iter()) {
            *dst = (label == best_label) as u8;
        }
    }
    (result, best_size)
}

/// Fill background regions that are not 4-connected to the image border
pub fn fill_holes(mask: &BinaryMask) -> BinaryMask {
    let (width, height) = (mask.width, mask.height);
    let mut outside = vec![false; width * height];
    let mut queue = VecDeque::new();

    let seed = |x: usize, y: usize, outside: &mut Vec<bool>, queue: &mut VecDeque<(usize, usize)>| {
        let idx = y * width + x;
        if !mask.is_set(x, y) && !outside[idx] {
            outside[idx] = true;
            queue.push_back((x, y));
        }
    };
    for x in 0..width {
        seed(x, 0, &mut outside, &mut queue);
        seed(x, height.saturating_sub(1), &mut outside, &mut queue);
    }
    for y in 0..height {
        seed(0, y, &mut outside, &mut queue);
        seed(width.saturating_sub(1), y, &mut outside, &mut queue);
    }

    while let Some((x, y)) = queue.pop_front() {
        for &(dx, dy) in &VON_NEUMANN_NEIGHBORHOOD {
            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
            if !in_bounds(nx, ny, width, height) {
                continue;
            }
            let idx = ny as usize * width + nx as usize;
            if !outside[idx] && !mask.is_set(nx as usize, ny as usize) {
                outside[idx] = true;
                queue.push_back((nx as usize, ny as usize));
            }
        }
    }

    let mut result = BinaryMask::new(width, height);
    for (dst, &out) in result.data.iter_mut().zip(outside.iter()) {
        *dst = (!out) as u8;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> BinaryMask {
        let mut mask = BinaryMask::new(rows[0].len(), rows.len());
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                mask.set(x, y, c == '#');
            }
        }
        mask
    }

    #[test]
    fn disk_of_radius_one_is_a_cross() {
        assert_eq!(disk_offsets(1).len(), 5);
        assert_eq!(disk_offsets(0), vec![(0, 0)]);
    }

    #[test]
    fn opening_removes_isolated_pixel() {
        let mask = mask_from_rows(&[
            ".......",
            ".#.....",
            ".......",
            "...###.",
            "...###.",
            "...###.",
            ".......",
        ]);
        let opened = apply_opening(&mask, 1);
        assert!(!opened.is_set(1, 1));
        assert!(opened.is_set(4, 4));
    }

    #[test]
    fn closing_bridges_one_pixel_gap() {
        let mask = mask_from_rows(&[
            ".........",
            ".###.###.",
            ".###.###.",
            ".###.###.",
            ".........",
        ]);
        let closed = apply_closing(&mask, 1);
        assert!(closed.is_set(4, 2));
    }

    #[test]
    fn largest_component_wins() {
        let mask = mask_from_rows(&[
            "##......",
            "##......",
            ".....###",
            "....####",
            ".....###",
        ]);
        let (largest, size) = largest_component(&mask);
        assert_eq!(size, 10);
        assert!(!largest.is_set(0, 0));
        assert!(largest.is_set(7, 3));
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mask = mask_from_rows(&["#..", ".#.", "..#"]);
        let (_, size) = largest_component(&mask);
        assert_eq!(size, 3);
    }

    #[test]
    fn fill_holes_closes_ring() {
        let mask = mask_from_rows(&[
            ".....",
            ".###.",
            ".#.#.",
            ".###.",
            ".....",
        ]);
        let filled = fill_holes(&mask);
        assert!(filled.is_set(2, 2));
        assert!(!filled.is_set(0, 0));
        assert_eq!(filled.count(), 9);
    }
}
