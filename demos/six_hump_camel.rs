//! Minimize the six-hump camel function and print every local minimum found.
//!
//! Run with `RUST_LOG=debug cargo run --example six_hump_camel` to see per-sweep logs.

use mcs::McsBuilder;

fn six_hump_camel(x: &[f64]) -> f64 {
    let (a, b) = (x[0], x[1]);
    (4.0 - 2.1 * a * a + a.powi(4) / 3.0) * a * a + a * b + (-4.0 + 4.0 * b * b) * b * b
}

fn main() {
    env_logger::init();

    let bounds = vec![(-3.0, 3.0), (-2.0, 2.0)];
    let result = match McsBuilder::new(six_hump_camel, bounds)
        .max_feval(2000)
        .max_sweeps(200)
        .local(10)
        .minimize()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    println!("{result}");
    println!("{:<4} {:>12} {:>12} {:>14}", "#", "x0", "x1", "f");
    for (i, m) in result.local_minima.iter().enumerate() {
        println!("{:<4} {:>12.6} {:>12.6} {:>14.8}", i, m.x[0], m.x[1], m.fun);
    }
}
