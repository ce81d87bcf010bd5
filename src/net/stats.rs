use serde::Serialize;

/// Per-rule interaction counters, reset together with the heap and folded
/// into the backend's cumulative statistics after each evaluation.
#[derive(Clone, Default, Serialize)]
pub struct Rewrites {
    pub app_lam: u64,
    pub app_sup: u64,
    pub dup_copy: u64,
    pub dup_ctr: u64,
    pub dup_lam: u64,
    pub annihilate: u64,
    pub commute: u64,
    pub mat: u64,
    pub op2: u64,
}

impl Rewrites {
    pub fn total(&self) -> u64 {
        self.app_lam
            + self.app_sup
            + self.dup_copy
            + self.dup_ctr
            + self.dup_lam
            + self.annihilate
            + self.commute
            + self.mat
            + self.op2
    }

    pub fn show(&self) -> String {
        format!(
            "\
            \tApply: {}\n\
            \tApply/fork: {}\n\
            \tCopy: {}\n\
            \tCopy constructor: {}\n\
            \tCopy lambda: {}\n\
            \tAnnihilate: {}\n\
            \tCommute: {}\n\
            \tMatch: {}\n\
            \tArithmetic: {}\n\
            \tTotal: {}\n\
        ",
            self.app_lam,
            self.app_sup,
            self.dup_copy,
            self.dup_ctr,
            self.dup_lam,
            self.annihilate,
            self.commute,
            self.mat,
            self.op2,
            self.total(),
        )
    }

    pub fn clear(&mut self) {
        *self = Rewrites::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_sums_every_rule() {
        let mut r = Rewrites::default();
        r.app_lam = 3;
        r.mat = 2;
        r.op2 = 1;
        assert_eq!(r.total(), 6);
        r.clear();
        assert_eq!(r.total(), 0);
    }
}
