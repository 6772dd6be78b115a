pub use anyhow::{ensure, format_err, Context as _, Result};
pub use chrono::Local;
pub use itertools::Itertools as _;
pub use log::{info, warn};
pub use rand::{rngs::StdRng, Rng, SeedableRng};
pub use serde::{Deserialize, Serialize};
pub use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::Kind;
