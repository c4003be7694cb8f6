pub mod bench_filter;
pub mod bench_grid;
pub mod data;
