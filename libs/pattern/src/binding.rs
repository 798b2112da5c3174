//! The net/endpoint binding algebra.
//!
//! A net expands to `N` atoms and an endpoint to `M` atoms. The two
//! sequences bind when `N == 1` (the net broadcasts), `M == N` (bind by
//! index), or when the named-axis broadcast rule applies: the net's axis
//! sequence is a left-to-right subsequence of the endpoint's, every shared
//! axis has the same length, and neither side contains an unnamed group.
//! The net list then repeats across the extra-axis combinations in
//! endpoint-expansion order.

use crate::Axis;

/// How a net's atoms pair with an endpoint's atoms.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Binding {
    /// The single net atom binds every endpoint atom.
    Broadcast,
    /// Atom `i` of the net binds atom `i` of the endpoint.
    ByIndex,
    /// `map[e]` is the net atom bound to endpoint atom `e`.
    AxisMap(Vec<usize>),
}

impl Binding {
    /// The net atom index bound to endpoint atom `e`.
    pub fn net_index(&self, e: usize) -> usize {
        match self {
            Self::Broadcast => 0,
            Self::ByIndex => e,
            Self::AxisMap(map) => map[e],
        }
    }
}

/// An error computing a binding.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BindError {
    /// The lengths are incompatible and no broadcast applies.
    #[error("cannot bind a net of {net_len} atoms to an endpoint of {endpoint_len} atoms")]
    LengthMismatch {
        /// Net expansion length.
        net_len: usize,
        /// Endpoint expansion length.
        endpoint_len: usize,
    },
    /// Axes shared by name have different lengths.
    #[error("axis `{axis}` has length {net_len} on the net but {endpoint_len} on the endpoint")]
    AxisMismatch {
        /// The shared axis.
        axis: String,
        /// Its length on the net.
        net_len: usize,
        /// Its length on the endpoint.
        endpoint_len: usize,
    },
}

/// Computes the binding between a net and an endpoint.
///
/// `net_axes` and `endpoint_axes` are the axis sequences of the two
/// expansions, or `None` when a side has no usable axis sequence (an
/// unnamed group or a splice).
pub fn bind(
    net_len: usize,
    net_axes: Option<&[Axis]>,
    endpoint_len: usize,
    endpoint_axes: Option<&[Axis]>,
) -> Result<Binding, BindError> {
    if net_len == 1 {
        return Ok(Binding::Broadcast);
    }
    if net_len == endpoint_len {
        return Ok(Binding::ByIndex);
    }

    let mismatch = || BindError::LengthMismatch {
        net_len,
        endpoint_len,
    };

    let (net_axes, endpoint_axes) = match (net_axes, endpoint_axes) {
        (Some(n), Some(e)) => (n, e),
        _ => return Err(mismatch()),
    };

    // The axis products must account for the full expansions, otherwise
    // the positional projection below is meaningless.
    if product(net_axes) != net_len || product(endpoint_axes) != endpoint_len {
        return Err(mismatch());
    }

    // Greedy left-to-right subsequence match of net axes in endpoint axes.
    let mut positions = Vec::with_capacity(net_axes.len());
    let mut next = 0;
    for axis in net_axes {
        let found = endpoint_axes[next..]
            .iter()
            .position(|candidate| candidate.id == axis.id)
            .ok_or_else(mismatch)?;
        let at = next + found;
        if endpoint_axes[at].len != axis.len {
            return Err(BindError::AxisMismatch {
                axis: axis.id.to_string(),
                net_len: axis.len,
                endpoint_len: endpoint_axes[at].len,
            });
        }
        positions.push(at);
        next = at + 1;
    }

    // Mixed-radix strides, leftmost axis slowest, matching expansion order.
    let endpoint_strides = strides(endpoint_axes);
    let net_strides = strides(net_axes);

    let mut map = Vec::with_capacity(endpoint_len);
    for e in 0..endpoint_len {
        let mut net_atom = 0;
        for (k, &at) in positions.iter().enumerate() {
            let idx = (e / endpoint_strides[at]) % endpoint_axes[at].len;
            net_atom += idx * net_strides[k];
        }
        map.push(net_atom);
    }
    Ok(Binding::AxisMap(map))
}

fn product(axes: &[Axis]) -> usize {
    axes.iter().map(|a| a.len).product()
}

fn strides(axes: &[Axis]) -> Vec<usize> {
    let mut strides = vec![1usize; axes.len()];
    for i in (0..axes.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * axes[i + 1].len;
    }
    strides
}
