use std::future::Future;

use crate::Result;

/// Run one async computation to completion at a synchronous call site.
///
/// The engine is async throughout; top-level call sites that are not already
/// inside a runtime use this to fire, await, and exit.
pub fn block_on<T, F>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on() {
        let value = block_on(async { Ok(41 + 1) }).unwrap();
        assert_eq!(value, 42);
    }
}
