use crate::errors::GridError;

///
/// Row-major strides for a set of radices (last entry varies fastest).
/// Fails with `SizeOverflow` if the total count does not fit in `usize`.
///
pub fn row_major_strides(radices: &[usize]) -> Result<(Vec<usize>, usize), GridError>
{
    let mut strides = vec![0; radices.len()];
    let mut total: usize = 1;
    for (stride, &radix) in strides.iter_mut().zip(radices).rev()
    {
        *stride = total;
        total = total.checked_mul(radix).ok_or(GridError::SizeOverflow)?;
    }
    Ok((strides, total))
}

/// Compose a flat index from a multi-index. No range checks.
#[inline]
pub fn compose(indices: &[usize], strides: &[usize]) -> usize
{
    indices.iter().zip(strides).map(|(&i, &s)| i * s).sum()
}

///
/// Inverse of `compose`: successive division from the slowest to the fastest axis.
///
#[inline]
pub fn decompose(mut index: usize, strides: &[usize], out: &mut [usize])
{
    for (o, &stride) in out.iter_mut().zip(strides)
    {
        *o = index / stride;
        index %= stride;
    }
}

///
/// Advance `current` to the next multi-index in row-major order within `bounds`.
/// Returns false (and resets `current` to zero) once every combination has been visited.
///
#[inline]
pub fn next_multi_index(current: &mut [usize], bounds: &[usize]) -> bool
{
    for dim in (0..current.len()).rev()
    {
        current[dim] += 1;
        if current[dim] < bounds[dim]
        {
            return true;
        }
        current[dim] = 0;
    }
    false
}

#[test]
fn check_compose_decompose_roundtrip()
{
    let radices = [3, 4, 5];
    let (strides, total) = row_major_strides(&radices).unwrap();
    assert_eq!(strides, vec![20, 5, 1]);
    assert_eq!(total, 60);
    let mut tuple = [0; 3];
    for i in 0..total
    {
        decompose(i, &strides, &mut tuple);
        assert_eq!(compose(&tuple, &strides), i);
    }
}

#[test]
fn check_next_multi_index_is_row_major()
{
    let bounds = [2, 3, 2];
    let (strides, total) = row_major_strides(&bounds).unwrap();
    let mut current = [0; 3];
    let mut expected = [0; 3];
    for i in 0..total
    {
        decompose(i, &strides, &mut expected);
        assert_eq!(current, expected);
        assert_eq!(next_multi_index(&mut current, &bounds), i + 1 < total);
    }
    assert_eq!(current, [0, 0, 0]);
}

#[test]
fn check_overflow_detected()
{
    assert_eq!(row_major_strides(&[usize::MAX, 2]), Err(GridError::SizeOverflow));
}
