/// Statistics collected over one copy operation
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Archive bytes moved from the source session into the destination session
    pub bytes_relayed: u64,
    /// Wall time from the first session start until both sessions terminated
    pub elapsed: std::time::Duration,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            (self.bytes_relayed as f64 / secs) as u64
        } else {
            0
        };
        write!(
            f,
            "bytes relayed: {}\n\
            elapsed: {:.3}s\n\
            average rate: {}/s\n",
            bytesize::ByteSize(self.bytes_relayed),
            secs,
            bytesize::ByteSize(rate),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_bytes_and_time() {
        let summary = Summary {
            bytes_relayed: 2048,
            elapsed: std::time::Duration::from_secs(2),
        };
        let text = summary.to_string();
        assert!(text.contains("bytes relayed: "), "{text}");
        assert!(text.contains("elapsed: 2.000s"), "{text}");
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let text = Summary::default().to_string();
        assert!(text.contains("elapsed: 0.000s"), "{text}");
        assert!(text.contains("average rate: "), "{text}");
    }
}
