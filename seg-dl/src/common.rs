pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use derivative::Derivative;
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::{izip, Itertools as _};
pub use log::{debug, info, warn};
pub use ndarray::{Array2, ArrayView2};
pub use noisy_float::prelude::*;
pub use rand::{
    distributions::{Distribution, WeightedIndex},
    prelude::*,
    RngCore,
};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::{Borrow, Cow},
    collections::{HashMap, HashSet},
    fmt::{self, Debug},
    fs,
    iter,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
pub use tch::{
    kind::{FLOAT_CPU, INT64_CPU},
    vision, Device, IndexOp, Kind, Tensor,
};
pub use tch_tensor_like::TensorLike;

unzip_n::unzip_n!(pub 11);
