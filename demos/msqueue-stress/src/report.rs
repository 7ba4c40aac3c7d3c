use anyhow::bail;

use crate::Result;
use crate::driver::Item;

/// Outcome of a stress run.
#[derive(Clone, Debug, Default)]
pub struct Report {
    /// Number of items enqueued, indexed by producer.
    pub produced: Vec<u64>,
    /// Items in dequeue order, indexed by consumer.
    pub consumed: Vec<Vec<Item>>,
}

impl Report {
    pub fn total_produced(&self) -> u64 {
        self.produced.iter().sum()
    }

    pub fn total_consumed(&self) -> usize {
        self.consumed.iter().map(Vec::len).sum()
    }

    /// Checks that every produced item was consumed exactly once, and that
    /// each consumer received the items of a producer in their enqueue order.
    pub fn verify(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.produced.len());
        for (p, &n) in self.produced.iter().enumerate() {
            let Ok(n) = usize::try_from(n) else {
                bail!("too many items to verify, producer={p}, produced={n}");
            };
            seen.push(vec![false; n]);
        }

        for (c, items) in self.consumed.iter().enumerate() {
            let mut last = vec![None::<u64>; self.produced.len()];
            for item in items {
                let Item { producer: p, seq, .. } = *item;
                let slot = match usize::try_from(seq) {
                    Ok(i) => seen.get_mut(p).and_then(|s| s.get_mut(i)),
                    Err(_) => None,
                };
                let Some(slot) = slot else {
                    bail!("unknown item, consumer={c}, producer={p}, seq={seq}");
                };
                if std::mem::replace(slot, true) {
                    bail!("duplicated item, consumer={c}, producer={p}, seq={seq}");
                }
                if let Some(prev) = last[p].filter(|&prev| prev >= seq) {
                    bail!("reordered item, consumer={c}, producer={p}, seq={seq}, after={prev}");
                }
                last[p] = Some(seq);
            }
        }

        for (p, s) in seen.iter().enumerate() {
            if let Some(seq) = s.iter().position(|&b| !b) {
                bail!("lost item, producer={p}, seq={seq}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(producer: usize, seq: u64) -> Item {
        Item {
            producer,
            seq,
            value: fastrand::u32(0..100),
        }
    }

    fn report(produced: &[u64], consumed: &[&[(usize, u64)]]) -> Report {
        Report {
            produced: produced.to_vec(),
            consumed: consumed
                .iter()
                .map(|c| c.iter().map(|&(p, s)| item(p, s)).collect())
                .collect(),
        }
    }

    fn verify_err(r: &Report) -> String {
        r.verify().unwrap_err().to_string()
    }

    #[test]
    fn accepts_interleaved() {
        let r = report(&[3, 2], &[&[(0, 0), (1, 0), (0, 2)], &[(1, 1), (0, 1)]]);
        assert_eq!(r.total_produced(), 5);
        assert_eq!(r.total_consumed(), 5);
        r.verify().unwrap();
        Report::default().verify().unwrap();
    }

    #[test]
    fn rejects_duplicated() {
        let r = report(&[2], &[&[(0, 0), (0, 1)], &[(0, 1)]]);
        assert!(verify_err(&r).starts_with("duplicated item"));
    }

    #[test]
    fn rejects_lost() {
        let r = report(&[3], &[&[(0, 0)], &[(0, 2)]]);
        assert_eq!(verify_err(&r), "lost item, producer=0, seq=1");
    }

    #[test]
    fn rejects_reordered() {
        let r = report(&[2], &[&[(0, 1), (0, 0)]]);
        assert!(verify_err(&r).starts_with("reordered item"));
    }

    #[test]
    fn rejects_unknown() {
        let r = report(&[1], &[&[(0, 0), (0, 1)]]);
        assert!(verify_err(&r).starts_with("unknown item"));
        let r = report(&[1], &[&[(0, 0), (3, 0)]]);
        assert!(verify_err(&r).starts_with("unknown item"));
        let r = report(&[1], &[&[(0, 0), (0, u64::MAX)]]);
        assert_eq!(
            verify_err(&r),
            format!("unknown item, consumer=0, producer=0, seq={}", u64::MAX)
        );
    }
}
