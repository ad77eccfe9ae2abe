/// Threshold-crossing scan over one tube's count profile.
///
/// Scans `first..last` (with `last` clamped to the profile length). The scan
/// starts inside a strip shadow when `counts[first] < threshold` and records
/// every index where the profile crosses the threshold in either direction.
/// Noise is not filtered: spurious crossings show up as extra edges and are
/// rejected later by the edge-count check.
pub fn detect_edges(counts: &[f64], threshold: f64, first: usize, last: usize) -> Vec<usize> {
    let last = last.min(counts.len());
    if first >= last {
        return Vec::new();
    }

    let mut edges = Vec::new();
    let mut in_strip_region = counts[first] < threshold;
    for (i, &count) in counts.iter().enumerate().take(last).skip(first) {
        if in_strip_region && count >= threshold {
            edges.push(i);
            in_strip_region = false;
        } else if !in_strip_region && count < threshold {
            edges.push(i);
            in_strip_region = true;
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_both_sides_of_a_bright_plateau() {
        let counts = [50.0, 50.0, 800.0, 800.0, 800.0, 50.0, 50.0];
        assert_eq!(detect_edges(&counts, 400.0, 0, 7), vec![2, 5]);
    }

    #[test]
    fn finds_both_sides_of_a_shadow() {
        let counts = [900.0, 900.0, 20.0, 20.0, 900.0];
        assert_eq!(detect_edges(&counts, 400.0, 0, 5), vec![2, 4]);
    }

    #[test]
    fn respects_active_region() {
        let counts = [900.0, 20.0, 900.0, 900.0, 20.0, 20.0, 900.0];
        assert_eq!(detect_edges(&counts, 400.0, 2, 5), vec![4]);
        assert_eq!(detect_edges(&counts, 400.0, 2, 100), vec![4, 6]);
        assert!(detect_edges(&counts, 400.0, 5, 5).is_empty());
    }

    #[test]
    fn noise_produces_spurious_edges() {
        let counts = [900.0, 20.0, 450.0, 20.0, 900.0];
        assert_eq!(detect_edges(&counts, 400.0, 0, 5), vec![1, 2, 3, 4]);
    }
}
