//! Verify a segmented-reduction implementation across the full backend
//! matrix and exit with the harness protocol code.
//!
//! ```text
//! cargo run --example verify_reduce
//! ```

use crucible::oracle;
use crucible::prelude::*;

/// The "algorithm under test": segmented reduction via an explicit
/// boundary pass, unlike the oracle's single fused walk.
fn reduce_under_test(keys: &[i64], values: &[i64]) -> (Vec<i64>, Vec<i64>) {
    let mut out_keys = Vec::new();
    let mut out_values = Vec::new();
    let mut start = 0;
    for i in 1..=keys.len() {
        if i == keys.len() || keys[i] != keys[i - 1] {
            out_keys.push(keys[start]);
            out_values.push(values[start..i].iter().sum());
            start = i;
        }
    }
    (out_keys, out_values)
}

struct VerifyReduce;

impl MatrixCase<i64> for VerifyReduce {
    fn name(&self) -> &str {
        "verify_reduce"
    }

    fn roles(&self) -> usize {
        4
    }

    fn run(&mut self, cx: &mut CaseContext<'_, i64>) -> Result<()> {
        let n = cx.n;

        let mut keys_io = cx.transfer(MemoryRole::Keys, n);
        fill_with(&mut keys_io.get(), |i| (i / 4) as i64);
        let keys: Vec<i64> = keys_io.get().to_vec();
        keys_io.update_data()?;

        let mut values_io = cx.transfer(MemoryRole::Values, n);
        fill_with(&mut values_io.get(), |i| i as i64 % 9);
        let values: Vec<i64> = values_io.get().to_vec();
        values_io.update_data()?;

        let (out_keys, out_values) = reduce_under_test(&keys, &values);
        let segments = out_keys.len();

        let mut key_res = cx.transfer(MemoryRole::Result, n);
        key_res.get()[..segments].copy_from_slice(&out_keys);
        key_res.update_data_prefix(segments)?;
        let mut val_res = cx.transfer(MemoryRole::SecondaryResult, n);
        val_res.get()[..segments].copy_from_slice(&out_values);
        val_res.update_data_prefix(segments)?;
        cx.wait()?;

        let mut expected_keys = vec![0i64; n];
        let mut expected_values = vec![0i64; n];
        let expected = oracle::reduce_by_segment(
            &keys,
            &values,
            &mut expected_keys,
            &mut expected_values,
            0,
            |a, b| a == b,
            |a, b| a + b,
        );
        expect_eq!(expected, segments, "wrong segment count from reduce_by_segment");

        key_res.retrieve_data()?;
        expect_eq_n!(
            &expected_keys[..expected],
            &key_res.get()[..expected],
            "wrong keys from reduce_by_segment"
        );
        val_res.retrieve_data()?;
        expect_eq_n!(
            &expected_values[..expected],
            &val_res.get()[..expected],
            "wrong values from reduce_by_segment"
        );
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let status = match crucible::run_matrix(&mut VerifyReduce) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    std::process::exit(done(status));
}
