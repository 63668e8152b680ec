//! Sharing of a capacity among competing consumers.

/// Shares the capacity among consumers by water-filling.
///
/// Consumers are visited in ascending order of request (ties are broken by consumer key),
/// each one receives `min(request, remaining / consumers_left)`. Consumers requesting less than the fair share
/// get their full request and the leftover is distributed among the others.
///
/// Returns the grants in the order of `requests`. The sum of grants never exceeds the capacity.
pub fn water_fill<K: Ord + Copy>(capacity: f64, requests: &[(K, f64)]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by(|&a, &b| {
        requests[a]
            .1
            .total_cmp(&requests[b].1)
            .then_with(|| requests[a].0.cmp(&requests[b].0))
    });
    let mut grants = vec![0.; requests.len()];
    let mut remaining = capacity.max(0.);
    let mut left = requests.len();
    for idx in order {
        let request = requests[idx].1.max(0.);
        let grant = request.min(remaining / left as f64);
        grants[idx] = grant;
        remaining = (remaining - grant).max(0.);
        left -= 1;
    }
    grants
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_enough_capacity_for_everyone() {
        let grants = water_fill(100., &[(1, 10.), (2, 20.), (3, 30.)]);
        assert_eq!(grants, vec![10., 20., 30.]);
    }

    #[test]
    fn test_leftover_goes_to_larger_requests() {
        // 90 / 3 = 30, the first takes 10, the remaining 80 are split into 40 + 40
        let grants = water_fill(90., &[(3, 100.), (1, 10.), (2, 50.)]);
        assert_abs_diff_eq!(grants[0], 40., epsilon = 1e-9);
        assert_abs_diff_eq!(grants[1], 10., epsilon = 1e-9);
        assert_abs_diff_eq!(grants[2], 40., epsilon = 1e-9);
        assert!(grants.iter().sum::<f64>() <= 90. + 1e-9);
    }

    #[test]
    fn test_equal_requests_get_equal_shares() {
        let grants = water_fill(1000., &[(2, 1000.), (1, 1000.)]);
        assert_eq!(grants, vec![500., 500.]);
    }

    #[test]
    fn test_no_capacity() {
        let grants = water_fill(0., &[(1, 10.), (2, 20.)]);
        assert_eq!(grants, vec![0., 0.]);
        assert!(water_fill::<u32>(10., &[]).is_empty());
    }
}
