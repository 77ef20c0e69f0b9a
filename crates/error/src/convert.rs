use crate::{ErrorCode, ErrorContext, LowdeckError};

impl From<reqwest::Error> for LowdeckError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string());

        if err.is_timeout() {
            return LowdeckError::new(ErrorCode::ConnectionTimeout, err.to_string());
        }

        match err.status() {
            Some(status) if status.as_u16() == 401 => LowdeckError::new(
                ErrorCode::UnauthorizedClient,
                "Upstream rejected the access token",
            )
            .with_context(ErrorContext::Http {
                status: status.as_u16(),
                url,
            }),
            Some(status) => LowdeckError::new(ErrorCode::QueryFailed, err.to_string())
                .with_context(ErrorContext::Http {
                    status: status.as_u16(),
                    url,
                }),
            None => LowdeckError::new(ErrorCode::QueryFailed, err.to_string()),
        }
    }
}

impl From<serde_json::Error> for LowdeckError {
    fn from(err: serde_json::Error) -> Self {
        LowdeckError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

/// Levenshtein-based suggestion, used to hint at the closest known name when
/// an expression references an unknown server variable.
pub fn closest_match(target: &str, options: &[String]) -> Option<String> {
    let mut best_match: Option<&str> = None;
    let mut min_distance = usize::MAX;

    for option in options {
        let distance = levenshtein(target, option);
        if distance < min_distance && distance <= 3 {
            min_distance = distance;
            best_match = Some(option.as_str());
        }
    }

    best_match.map(|s| s.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0; b.len() + 1]; a.len() + 1];

    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in dp[0].iter_mut().enumerate() {
        *val = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = std::cmp::min(
                std::cmp::min(dp[i - 1][j] + 1, dp[i][j - 1] + 1),
                dp[i - 1][j - 1] + cost,
            );
        }
    }

    dp[a.len()][b.len()]
}
