use crate::common_io::{mkdir, read_lines, write_lines};
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use std::fmt::{Debug, Display};
use std::str::FromStr;

fn format_row<'a, T, I>(row: I, delim: &str) -> String
where
    T: Display + 'a,
    I: Iterator<Item = &'a T>,
{
    row.map(|x| format!("{}", x)).collect::<Vec<_>>().join(delim)
}

impl<T> IoOps for DMatrix<T>
where
    T: nalgebra::Scalar + Send + Sync + FromStr + Display + Copy,
    <T as FromStr>::Err: Debug + Display,
{
    type Scalar = T;
    type Mat = Self;

    fn read_file_delim(
        file: &str,
        delim: &str,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let lines = read_lines(file)?;
        let skip = skip.unwrap_or(0);

        let rows = lines
            .iter()
            .skip(skip)
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split(delim)
                    .map(|x| {
                        x.trim()
                            .parse::<T>()
                            .map_err(|e| anyhow::anyhow!("failed to parse {:?}: {}", x, e))
                    })
                    .collect::<anyhow::Result<Vec<T>>>()
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        if rows.is_empty() {
            anyhow::bail!("No data in file {}", file);
        }

        let ncols = rows[0].len();
        if rows.iter().any(|r| r.len() != ncols) {
            anyhow::bail!("rows of {} have different numbers of columns", file);
        }

        let nrows = rows.len();
        Ok(DMatrix::<T>::from_row_iterator(
            nrows,
            ncols,
            rows.into_iter().flatten(),
        ))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        mkdir(file)?;
        // indexed par_iter keeps the order of the rows
        let lines = (0..self.nrows())
            .into_par_iter()
            .map(|i| format_row(self.row(i).iter(), delim).into_boxed_str())
            .collect::<Vec<_>>();
        write_lines(&lines, file)
    }

    fn write_file_delim_with_names(
        &self,
        file: &str,
        delim: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
    ) -> anyhow::Result<()> {
        if row_names.len() != self.nrows() {
            anyhow::bail!(
                "{} row names for {} rows",
                row_names.len(),
                self.nrows()
            );
        }
        if column_names.len() != self.ncols() {
            anyhow::bail!(
                "{} column names for {} columns",
                column_names.len(),
                self.ncols()
            );
        }

        mkdir(file)?;

        let header = std::iter::once("name".to_string())
            .chain(column_names.iter().map(|x| x.to_string()))
            .collect::<Vec<_>>()
            .join(delim)
            .into_boxed_str();

        let body = (0..self.nrows())
            .into_par_iter()
            .map(|i| {
                format!(
                    "{}{}{}",
                    row_names[i],
                    delim,
                    format_row(self.row(i).iter(), delim)
                )
                .into_boxed_str()
            })
            .collect::<Vec<_>>();

        let lines = std::iter::once(header).chain(body).collect::<Vec<_>>();
        write_lines(&lines, file)
    }
}
