use crate::traits::MatTriplets;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use num_traits::Zero;

/// Build a `CooMatrix` from triplets, checking bounds
fn coo_from_triplets<T>(
    nrow: usize,
    ncol: usize,
    triplets: Vec<(usize, usize, T)>,
) -> anyhow::Result<CooMatrix<T>>
where
    T: nalgebra::Scalar + Copy,
{
    let mut coo = CooMatrix::new(nrow, ncol);
    for (i, j, x) in triplets {
        if i >= nrow || j >= ncol {
            anyhow::bail!("triplet ({}, {}) out of bounds {} x {}", i, j, nrow, ncol);
        }
        coo.push(i, j, x);
    }
    Ok(coo)
}

impl<T> MatTriplets for DMatrix<T>
where
    T: nalgebra::Scalar + Zero + Copy,
{
    type Mat = Self;
    type Scalar = T;

    fn from_nonzero_triplets(
        nrow: usize,
        ncol: usize,
        triplets: Vec<(usize, usize, T)>,
    ) -> anyhow::Result<Self> {
        let mut ret = DMatrix::<T>::zeros(nrow, ncol);
        for (i, j, x) in triplets {
            if i >= nrow || j >= ncol {
                anyhow::bail!("triplet ({}, {}) out of bounds {} x {}", i, j, nrow, ncol);
            }
            ret[(i, j)] = x;
        }
        Ok(ret)
    }

    fn to_nonzero_triplets(&self) -> anyhow::Result<(usize, usize, Vec<(usize, usize, T)>)> {
        let mut triplets = vec![];
        // column-major storage
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                let x = self[(i, j)];
                if !x.is_zero() {
                    triplets.push((i, j, x));
                }
            }
        }
        Ok((self.nrows(), self.ncols(), triplets))
    }
}

impl<T> MatTriplets for CsrMatrix<T>
where
    T: nalgebra::Scalar + Zero + Copy,
    for<'a> CsrMatrix<T>: From<&'a CooMatrix<T>>,
{
    type Mat = Self;
    type Scalar = T;

    fn from_nonzero_triplets(
        nrow: usize,
        ncol: usize,
        triplets: Vec<(usize, usize, T)>,
    ) -> anyhow::Result<Self> {
        let coo = coo_from_triplets(nrow, ncol, triplets)?;
        Ok(CsrMatrix::from(&coo))
    }

    fn to_nonzero_triplets(&self) -> anyhow::Result<(usize, usize, Vec<(usize, usize, T)>)> {
        let triplets = self
            .triplet_iter()
            .filter(|(_, _, &x)| !x.is_zero())
            .map(|(i, j, &x)| (i, j, x))
            .collect();
        Ok((self.nrows(), self.ncols(), triplets))
    }
}

impl<T> MatTriplets for CscMatrix<T>
where
    T: nalgebra::Scalar + Zero + Copy,
    for<'a> CscMatrix<T>: From<&'a CooMatrix<T>>,
{
    type Mat = Self;
    type Scalar = T;

    fn from_nonzero_triplets(
        nrow: usize,
        ncol: usize,
        triplets: Vec<(usize, usize, T)>,
    ) -> anyhow::Result<Self> {
        let coo = coo_from_triplets(nrow, ncol, triplets)?;
        Ok(CscMatrix::from(&coo))
    }

    fn to_nonzero_triplets(&self) -> anyhow::Result<(usize, usize, Vec<(usize, usize, T)>)> {
        let triplets = self
            .triplet_iter()
            .filter(|(_, _, &x)| !x.is_zero())
            .map(|(i, j, &x)| (i, j, x))
            .collect();
        Ok((self.nrows(), self.ncols(), triplets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_and_sparse_triplets_agree() -> anyhow::Result<()> {
        let triplets = vec![(0, 1, 2.0_f32), (2, 0, 1.0), (1, 3, 5.0)];

        let dense = DMatrix::<f32>::from_nonzero_triplets(3, 4, triplets.clone())?;
        let csr = CsrMatrix::<f32>::from_nonzero_triplets(3, 4, triplets.clone())?;
        let csc = CscMatrix::<f32>::from_nonzero_triplets(3, 4, triplets)?;

        let mut a = dense.to_nonzero_triplets()?.2;
        let mut b = csr.to_nonzero_triplets()?.2;
        let mut c = csc.to_nonzero_triplets()?.2;

        let key = |t: &(usize, usize, f32)| (t.0, t.1);
        a.sort_by_key(key);
        b.sort_by_key(key);
        c.sort_by_key(key);

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 3);
        Ok(())
    }

    #[test]
    fn test_out_of_bounds_triplet() {
        let triplets = vec![(3, 0, 1.0_f32)];
        assert!(DMatrix::<f32>::from_nonzero_triplets(3, 4, triplets.clone()).is_err());
        assert!(CsrMatrix::<f32>::from_nonzero_triplets(3, 4, triplets).is_err());
    }
}
