mod combinators_test;
mod common;
mod limiter_test;
mod pipeline_test;
mod sync_test;
