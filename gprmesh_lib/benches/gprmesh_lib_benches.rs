mod benches;

use criterion::criterion_main;

use benches::bench_filter::bench_filter;
use benches::bench_grid::bench_grid;

criterion_main!(bench_filter, bench_grid);
