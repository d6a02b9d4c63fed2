//! Spectral projection of the link graph.
//!
//! The random-walk transition matrix `T = D⁻¹A` is similar to the symmetric
//! matrix `S = D^-½ A D^-½`: if `S u = λ u` then `T (D^-½ u) = λ (D^-½ u)`.
//! We therefore run a symmetric eigensolver on `S` and map the eigenvectors
//! back. The leading eigenvectors of `T` are the smallest weighted
//! eigenvectors of the Laplacian `L = D - A`, i.e. the usual
//! spectral-clustering coordinates.
//!
//! The solver is a thick-restart block Lanczos method: each cycle grows a
//! block Krylov basis from the previous cycle's best Ritz vectors plus the
//! residual block, then does Rayleigh-Ritz on the whole basis.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::ProjectionConfig;
use crate::error::PipelineError;
use crate::graph::{LinkGraph, SparseMatrix};

/// Vectors added per Krylov step; also the largest eigenvalue multiplicity
/// resolved within one cycle.
const BLOCK: usize = 4;
/// Basis columns beyond `2d`.
const EXTRA_BASIS: usize = 32;
const JACOBI_MAX_SWEEPS: usize = 100;

/// Spectral coordinates of every graph node.
#[derive(Debug, Clone)]
pub struct Projection {
    /// n×d, row i belongs to node i of the graph.
    pub embedding: Array2<f64>,
    /// Eigenvalues of `T`, by decreasing magnitude.
    pub eigenvalues: Vec<f64>,
    /// Whether the shifted retry produced the result.
    pub regularized: bool,
}

/// Knobs of one solver attempt.
#[derive(Debug, Clone, Copy)]
struct Attempt {
    shift: f64,
    seed: u64,
    basis: usize,
}

pub fn project(graph: &LinkGraph, config: &ProjectionConfig) -> Result<Projection, PipelineError> {
    let n = graph.node_count();
    let d = config.dimension;
    if d == 0 || d >= n {
        return Err(PipelineError::Dimension {
            requested: d,
            nodes: n,
        });
    }

    let adjacency = graph.adjacency_matrix();
    let inv_sqrt_degree: Vec<f64> = adjacency
        .row_sums()
        .into_iter()
        .map(|deg| 1.0 / deg.sqrt())
        .collect();
    let operator = adjacency.scaled(&inv_sqrt_degree, &inv_sqrt_degree);
    debug!(n, nnz = operator.nnz(), "built normalized operator");

    let first = Attempt {
        shift: 0.0,
        seed: config.seed,
        basis: 2 * d + EXTRA_BASIS,
    };
    // the retry shifts the operator, starts from a fresh block and doubles the basis
    let retry = Attempt {
        shift: config.regularization,
        seed: config.seed.wrapping_add(1),
        basis: 2 * first.basis,
    };

    let (values, vectors, regularized) = match top_eigenpairs(&operator, d, first, config) {
        Ok((values, vectors)) => (values, vectors, false),
        Err(iterations) => {
            warn!(
                n,
                d,
                iterations,
                shift = config.regularization,
                "eigensolver did not converge, retrying with regularization"
            );
            let (values, vectors) =
                top_eigenpairs(&operator, d, retry, config).map_err(|iterations| {
                    PipelineError::EigenConvergence {
                        nodes: n,
                        dimension: d,
                        iterations,
                    }
                })?;
            (values, vectors, true)
        }
    };

    let mut embedding = vectors;
    for (mut row, scale) in embedding.axis_iter_mut(Axis(0)).zip(&inv_sqrt_degree) {
        row *= *scale;
    }
    for mut column in embedding.axis_iter_mut(Axis(1)) {
        let norm = column.dot(&column).sqrt();
        if norm > 0.0 {
            column /= norm;
        }
        if leading_sign(column.view()) < 0.0 {
            column *= -1.0;
        }
    }

    info!(n, d, regularized, top = ?values.first(), "projected graph");
    Ok(Projection {
        embedding,
        eigenvalues: values,
        regularized,
    })
}

/// Sign of the largest-magnitude entry, so eigenvector signs are stable.
fn leading_sign(v: ArrayView1<'_, f64>) -> f64 {
    v.iter()
        .copied()
        .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best })
        .signum()
}

/// Leading `d` eigenpairs of `operator + shift·I` by magnitude. Eigenvalues
/// are reported without the shift. `Err` carries the number of restart
/// cycles spent when it gives up.
fn top_eigenpairs(
    operator: &SparseMatrix,
    d: usize,
    attempt: Attempt,
    config: &ProjectionConfig,
) -> Result<(Vec<f64>, Array2<f64>), usize> {
    let n = operator.dim();
    let m = attempt.basis.min(n);
    let block = BLOCK.min(m);
    let keep = (d + (m - d) / 2).min(m.saturating_sub(block)).max(d.min(m));
    let mut rng = StdRng::seed_from_u64(attempt.seed);

    let apply = |x: ArrayView2<'_, f64>| {
        let mut y = operator.mul_dense(x);
        if attempt.shift != 0.0 {
            y.scaled_add(attempt.shift, &x);
        }
        y
    };

    let mut kept = Array2::<f64>::zeros((n, 0));
    let mut kept_image = Array2::<f64>::zeros((n, 0));
    let mut start = Array2::from_shape_fn((n, block), |_| rng.gen_range(-1.0..1.0));

    for cycle in 1..=config.max_iterations {
        let mut basis = Array2::<f64>::zeros((n, m));
        let mut image = Array2::<f64>::zeros((n, m));
        let mut filled = kept.ncols();
        basis.slice_mut(s![.., ..filled]).assign(&kept);
        image.slice_mut(s![.., ..filled]).assign(&kept_image);

        let mut next = start;
        while filled < m {
            let width = block.min(m - filled);
            let carried = width.min(next.ncols());
            let mut q = Array2::from_shape_fn((n, width), |_| rng.gen_range(-1.0..1.0));
            q.slice_mut(s![.., ..carried])
                .assign(&next.slice(s![.., ..carried]));
            orthonormalize_against(basis.slice(s![.., ..filled]), &mut q, &mut rng);
            let aq = apply(q.view());
            basis.slice_mut(s![.., filled..filled + width]).assign(&q);
            image.slice_mut(s![.., filled..filled + width]).assign(&aq);
            filled += width;
            next = aq;
        }

        let h = basis.t().dot(&image);
        let (theta, u) = jacobi_eigen(&h);
        let order = magnitude_order(&theta);
        let u = u.select(Axis(1), &order);
        let theta: Vec<f64> = order.iter().map(|&i| theta[i]).collect();

        let ritz = basis.dot(&u);
        let ritz_image = image.dot(&u);

        if theta.iter().any(|t| !t.is_finite()) {
            return Err(cycle);
        }

        let converged = (0..d).all(|i| {
            let residual = &ritz_image.column(i) - &(&ritz.column(i) * theta[i]);
            residual.dot(&residual).sqrt() <= config.tolerance * theta[i].abs().max(1.0)
        });
        if converged {
            debug!(cycle, basis = m, "eigensolver converged");
            let values = theta[..d].iter().map(|t| t - attempt.shift).collect();
            return Ok((values, ritz.slice(s![.., ..d]).to_owned()));
        }

        // the part of the last image outside the basis continues the Krylov sequence
        project_out(basis.view(), &mut next);
        start = next;
        kept = ritz.slice(s![.., ..keep]).to_owned();
        kept_image = ritz_image.slice(s![.., ..keep]).to_owned();
    }

    Err(config.max_iterations)
}

fn magnitude_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].abs().total_cmp(&values[a].abs()));
    order
}

/// Remove from every column of `block` its component in span(`basis`).
fn project_out(basis: ArrayView2<'_, f64>, block: &mut Array2<f64>) {
    for mut column in block.axis_iter_mut(Axis(1)) {
        remove_component(basis, &mut column);
    }
}

fn remove_component(basis: ArrayView2<'_, f64>, column: &mut ArrayViewMut1<'_, f64>) {
    if basis.ncols() == 0 {
        return;
    }
    let coefficients = basis.t().dot(&column.view());
    let correction = basis.dot(&coefficients);
    *column -= &correction;
}

fn norm(v: ArrayView1<'_, f64>) -> f64 {
    v.dot(&v).sqrt()
}

/// Orthonormalize the columns of `q` against `basis` and each other, with
/// two Gram-Schmidt passes. Columns that collapse are replaced by random
/// directions; the caller guarantees `basis.ncols() + q.ncols() <= n`.
fn orthonormalize_against(basis: ArrayView2<'_, f64>, q: &mut Array2<f64>, rng: &mut StdRng) {
    let n = q.nrows();
    for j in 0..q.ncols() {
        for attempt in 0..4 {
            let before = norm(q.column(j));
            for _ in 0..2 {
                let (done, mut rest) = q.view_mut().split_at(Axis(1), j);
                let mut column = rest.column_mut(0);
                remove_component(basis, &mut column);
                remove_component(done.view(), &mut column);
            }
            let after = norm(q.column(j));
            if after > 1e-8 * before && after > 1e-300 {
                q.column_mut(j).mapv_inplace(|x| x / after);
                break;
            }
            if attempt == 3 {
                // leave it zero rather than NaN
                q.column_mut(j).fill(0.0);
                break;
            }
            let fresh: Array1<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
            q.column_mut(j).assign(&fresh);
        }
    }
}

/// Cyclic Jacobi eigendecomposition of a small symmetric matrix.
/// Returns eigenvalues and the matrix whose columns are eigenvectors.
fn jacobi_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let m = matrix.nrows();
    let mut a = matrix.clone();
    // symmetrize away round-off from Vᵀ S V
    for i in 0..m {
        for j in (i + 1)..m {
            let avg = 0.5 * (a[[i, j]] + a[[j, i]]);
            a[[i, j]] = avg;
            a[[j, i]] = avg;
        }
    }
    let mut v = Array2::eye(m);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..m)
            .flat_map(|i| ((i + 1)..m).map(move |j| (i, j)))
            .map(|(i, j)| a[[i, j]] * a[[i, j]])
            .sum();
        let total: f64 = a.iter().map(|x| x * x).sum();
        if off <= 1e-30 * total.max(1e-300) {
            break;
        }

        for p in 0..m {
            for q in (p + 1)..m {
                let apq = a[[p, q]];
                if apq.abs() < 1e-300 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..m {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..m {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..m {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    ((0..m).map(|i| a[[i, i]]).collect(), v)
}

// ── Tests ──
