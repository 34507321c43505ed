pub use pool::*;

mod pool;

#[cfg(test)]
mod tests;
