use crate::common::*;
use ndarray_npy::ReadNpyError;

/// Load a class list with one class name per line.
pub fn load_classes_file(path: impl AsRef<Path>) -> Result<IndexSet<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read classes file '{}'", path.display()))?;
    let lines: Vec<_> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let classes: IndexSet<_> = lines.iter().cloned().map(ToOwned::to_owned).collect();
    ensure!(
        lines.len() == classes.len(),
        "duplicated class names found in '{}'",
        path.display()
    );
    ensure!(
        !classes.is_empty(),
        "no classes found in '{}'",
        path.display()
    );
    Ok(classes)
}

/// Read and parse a JSON file.
pub fn load_json<T>(path: impl AsRef<Path>) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("unable to read '{}'", path.display()))?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("unable to parse '{}'", path.display()))?;
    Ok(value)
}

/// List files under `dir` matching a glob `pattern`, in sorted order.
pub fn glob_files(dir: impl AsRef<Path>, pattern: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    ensure!(dir.is_dir(), "directory '{}' does not exist", dir.display());

    let pattern = dir.join(pattern);
    let pattern = pattern
        .to_str()
        .ok_or_else(|| format_err!("non-UTF-8 path '{}'", pattern.display()))?;
    let paths: Vec<PathBuf> = glob::glob(pattern)?.try_collect()?;
    Ok(paths.into_iter().sorted().collect())
}

/// Map a file under `src_dir` to the file at the same relative location
/// under `dst_dir` with extension `ext`.
pub fn sibling_path(
    path: impl AsRef<Path>,
    src_dir: impl AsRef<Path>,
    dst_dir: impl AsRef<Path>,
    ext: &str,
) -> Result<PathBuf> {
    let path = path.as_ref();
    let src_dir = src_dir.as_ref();
    let rel = path.strip_prefix(src_dir).with_context(|| {
        format!(
            "'{}' is not under '{}'",
            path.display(),
            src_dir.display()
        )
    })?;
    Ok(dst_dir.as_ref().join(rel).with_extension(ext))
}

/// Load a single-channel label image, such as a PNG class map.
pub fn load_label_map(path: impl AsRef<Path>) -> Result<Array2<u8>> {
    let path = path.as_ref();
    let image = image::open(path)
        .with_context(|| format!("unable to load label map '{}'", path.display()))?
        .into_luma8();
    let (w, h) = image.dimensions();
    let array = Array2::from_shape_vec((h as usize, w as usize), image.into_raw())?;
    Ok(array)
}

/// Load a 2D integer mask stored as a `.npy` array.
///
/// Unsigned bytes, 32 and 64-bit integers and floats are accepted. Float
/// values are truncated toward zero.
pub fn load_npy_mask(path: impl AsRef<Path>) -> Result<Array2<i64>> {
    let path = path.as_ref();

    macro_rules! try_read {
        ($ty:ty) => {
            match ndarray_npy::read_npy::<_, Array2<$ty>>(path) {
                Ok(array) => return Ok(array.mapv(|value| value as i64)),
                Err(ReadNpyError::WrongDescriptor(_)) => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("unable to read mask '{}'", path.display()))
                }
            }
        };
    }

    try_read!(u8);
    try_read!(i64);
    try_read!(i32);
    try_read!(f32);
    try_read!(f64);

    bail!("unsupported mask dtype in '{}'", path.display())
}

/// Sorted distinct values of a mask.
pub fn unique_values<T>(mask: &Array2<T>) -> Vec<T>
where
    T: Copy + Ord,
{
    mask.iter().copied().sorted().dedup().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn classes_file_test() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("classes.txt");

        fs::write(&path, "road\ncar\n\nperson\n")?;
        let classes = load_classes_file(&path)?;
        assert_eq!(classes.len(), 3);
        assert_eq!(classes.get_index_of("car"), Some(1));

        fs::write(&path, "road\nroad\n")?;
        assert!(load_classes_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn npy_mask_dtype_test() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let path = dir.path().join("u8.npy");
        ndarray_npy::write_npy(&path, &array![[0u8, 2], [1, 0]])?;
        assert_eq!(load_npy_mask(&path)?, array![[0i64, 2], [1, 0]]);

        let path = dir.path().join("f64.npy");
        ndarray_npy::write_npy(&path, &array![[0f64, 3.0], [0.0, 0.0]])?;
        assert_eq!(unique_values(&load_npy_mask(&path)?), vec![0, 3]);
        Ok(())
    }

    #[test]
    fn sibling_path_test() -> Result<()> {
        let path = sibling_path("/data/train/image/a/01.jpg", "/data/train/image", "/data/train/mask", "npy")?;
        assert_eq!(path, PathBuf::from("/data/train/mask/a/01.npy"));
        assert!(sibling_path("/elsewhere/01.jpg", "/data/train/image", "/data/train/mask", "npy").is_err());
        Ok(())
    }
}
