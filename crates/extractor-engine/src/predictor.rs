//! 페이지네이션 중단 예측.
//!
//! 최근 페이지들의 결과 수를 보고 다음 페이지를 요청할 가치가 있는지 판단합니다.

use std::collections::{HashMap, VecDeque};

use extractor_core::StreamKey;

/// 키별로 보관하는 최근 결과 수 개수.
pub const WINDOW_CAPACITY: usize = 10;

/// 판단을 내리기 위한 최소 관측 수.
const MIN_OBSERVATIONS: usize = 3;

/// 페이지가 "희소"하다고 보는 `page_limit` 대비 비율.
const SPARSE_RATIO: f64 = 0.30;

/// 스트림 키별 슬라이딩 윈도우 예측기.
#[derive(Debug, Default)]
pub struct PaginationPredictor {
    windows: HashMap<StreamKey, VecDeque<usize>>,
}

impl PaginationPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 결과 수를 기록하고 계속 페이지를 요청할지 판단합니다.
    ///
    /// - 관측이 3개 미만이면 계속
    /// - 마지막 결과가 0이면 중단
    /// - 최근 3개가 모두 `0.3 * page_limit` 미만이면 중단
    pub fn should_continue(
        &mut self,
        key: &StreamKey,
        page_index: usize,
        result_count: usize,
        page_limit: usize,
    ) -> bool {
        let window = self.windows.entry(key.clone()).or_default();
        window.push_back(result_count);
        while window.len() > WINDOW_CAPACITY {
            window.pop_front();
        }

        if window.len() < MIN_OBSERVATIONS {
            return true;
        }
        if result_count == 0 {
            tracing::debug!(stream = %key, page_index, "Empty page, stopping pagination");
            return false;
        }

        let sparse_limit = page_limit as f64 * SPARSE_RATIO;
        let sparse = window
            .iter()
            .rev()
            .take(MIN_OBSERVATIONS)
            .all(|&count| (count as f64) < sparse_limit);
        if sparse {
            tracing::debug!(
                stream = %key,
                page_index,
                recent = ?window.iter().rev().take(MIN_OBSERVATIONS).collect::<Vec<_>>(),
                "Sparse pages, stopping pagination"
            );
            return false;
        }
        true
    }

    /// 키의 현재 윈도우 (오래된 것부터).
    pub fn window(&self, key: &StreamKey) -> Vec<usize> {
        self.windows
            .get(key)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StreamKey {
        StreamKey::spot_normal("BTCUSDT")
    }

    #[test]
    fn test_never_stops_before_three_observations() {
        let mut predictor = PaginationPredictor::new();
        let key = key();

        assert!(predictor.should_continue(&key, 0, 0, 100));
        assert!(predictor.should_continue(&key, 1, 0, 100));
        assert!(!predictor.should_continue(&key, 2, 0, 100));
    }

    #[test]
    fn test_stops_when_trailing_pages_are_sparse() {
        let mut predictor = PaginationPredictor::new();
        let key = key();
        let counts = [100, 100, 95, 20, 5, 3];

        let decisions: Vec<bool> = counts
            .iter()
            .enumerate()
            .map(|(i, &count)| predictor.should_continue(&key, i, count, 100))
            .collect();

        assert_eq!(decisions, vec![true, true, true, true, true, false]);
        assert_eq!(predictor.window(&key), counts.to_vec());
    }

    #[test]
    fn test_boundary_is_strict() {
        let mut predictor = PaginationPredictor::new();
        let key = key();

        // 30은 100의 30%와 같으므로 희소하지 않음
        assert!(predictor.should_continue(&key, 0, 30, 100));
        assert!(predictor.should_continue(&key, 1, 29, 100));
        assert!(predictor.should_continue(&key, 2, 29, 100));
        assert!(!predictor.should_continue(&key, 3, 29, 100));
    }

    #[test]
    fn test_window_capacity() {
        let mut predictor = PaginationPredictor::new();
        let key = key();

        for i in 0..25 {
            predictor.should_continue(&key, i, 100, 100);
        }
        assert_eq!(predictor.window(&key).len(), WINDOW_CAPACITY);
    }

    #[test]
    fn test_windows_are_per_key() {
        let mut predictor = PaginationPredictor::new();
        let spot = key();
        let futures = StreamKey::futures("BTCUSDT", "UMCBL");

        predictor.should_continue(&spot, 0, 1, 100);
        predictor.should_continue(&spot, 1, 1, 100);
        assert!(predictor.should_continue(&futures, 0, 1, 100));
        assert_eq!(predictor.window(&futures), vec![1]);
    }
}
