pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use itertools::Itertools;
pub use ndarray::{Array2, ArrayView2, Zip};
pub use serde::{Deserialize, Serialize};
pub use std::{borrow::Borrow, cmp::Ordering};
