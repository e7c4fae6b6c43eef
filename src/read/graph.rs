//! Folder coder-graph assembly and execution.
//!
//! A folder is a DAG of coders: bind pairs connect producer outputs to
//! consumer inputs, packed streams feed the remaining inputs, and
//! exactly one output is left unconsumed as the folder's result. This
//! module validates that shape, orders the coders topologically, and
//! runs them over in-memory buffers.
//!
//! Coders are addressed by small integer indices throughout; stream
//! indices are global across the folder in coder declaration order.

use crate::codec::CoderRegistry;
use crate::format::streams::{Folder, ResourceLimits};
use crate::{Error, Result};

/// Where a coder input stream gets its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputSource {
    /// Output stream with this global index, via a bind pair.
    Bound(usize),
    /// The k-th pack stream consumed by the folder.
    Packed(usize),
}

/// A validated, topologically ordered execution plan for one folder.
#[derive(Debug)]
pub(crate) struct FolderPlan {
    /// Coder indices in execution order.
    order: Vec<usize>,
    /// Source for every global input stream index.
    input_sources: Vec<InputSource>,
    /// Per-coder (first input, first output) global stream offsets.
    offsets: Vec<(usize, usize)>,
    /// Global index of the folder's final output stream.
    final_out: usize,
}

impl FolderPlan {
    /// Validates the folder's graph shape and computes an execution order.
    pub fn build(folder: &Folder) -> Result<Self> {
        let total_in = folder.total_in_streams() as usize;
        let total_out = folder.total_out_streams() as usize;
        let num_packed = folder.packed_streams.len();

        // total inputs = total outputs - 1 + packed streams
        if total_in + 1 != total_out + num_packed {
            return Err(Error::InvalidFormat(format!(
                "folder stream counts inconsistent: {} inputs, {} outputs, {} packed streams",
                total_in, total_out, num_packed
            )));
        }

        // Resolve every input stream to exactly one source.
        let mut input_sources = vec![None; total_in];

        for (i, bp) in folder.bind_pairs.iter().enumerate() {
            let slot = input_sources
                .get_mut(bp.in_index as usize)
                .ok_or_else(|| {
                    Error::InvalidFormat(format!(
                        "bind_pair[{}] input index {} out of range",
                        i, bp.in_index
                    ))
                })?;
            if slot.is_some() {
                return Err(Error::InvalidFormat(format!(
                    "input stream {} bound twice",
                    bp.in_index
                )));
            }
            if bp.out_index as usize >= total_out {
                return Err(Error::InvalidFormat(format!(
                    "bind_pair[{}] output index {} out of range",
                    i, bp.out_index
                )));
            }
            *slot = Some(InputSource::Bound(bp.out_index as usize));
        }

        for (k, &in_idx) in folder.packed_streams.iter().enumerate() {
            let slot = input_sources.get_mut(in_idx as usize).ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "packed stream {} input index {} out of range",
                    k, in_idx
                ))
            })?;
            if slot.is_some() {
                return Err(Error::InvalidFormat(format!(
                    "input stream {} fed by both a bind pair and a pack stream",
                    in_idx
                )));
            }
            *slot = Some(InputSource::Packed(k));
        }

        let input_sources: Vec<InputSource> = input_sources
            .into_iter()
            .enumerate()
            .map(|(i, src)| {
                src.ok_or_else(|| {
                    Error::InvalidFormat(format!("input stream {} is unsatisfied", i))
                })
            })
            .collect::<Result<_>>()?;

        // Every output except the folder output is consumed exactly once.
        let mut out_consumed = vec![false; total_out];
        for bp in &folder.bind_pairs {
            let slot = &mut out_consumed[bp.out_index as usize];
            if *slot {
                return Err(Error::InvalidFormat(format!(
                    "output stream {} consumed twice",
                    bp.out_index
                )));
            }
            *slot = true;
        }

        let mut unconsumed = out_consumed.iter().enumerate().filter(|(_, &c)| !c);
        let final_out = match (unconsumed.next(), unconsumed.next()) {
            (Some((idx, _)), None) => idx,
            _ => {
                return Err(Error::InvalidFormat(
                    "folder must have exactly one unconsumed output stream".into(),
                ));
            }
        };

        if folder.unpack_sizes.len() != total_out {
            return Err(Error::InvalidFormat(format!(
                "folder declares {} output sizes for {} output streams",
                folder.unpack_sizes.len(),
                total_out
            )));
        }

        let offsets = folder.coder_stream_offsets();

        // Kahn's algorithm over coder-level dependencies. A coder is
        // ready once every bound input's producer has run; a leftover
        // coder means a cycle.
        let owner_of_output = {
            let mut owners = vec![0usize; total_out];
            for (coder_idx, coder) in folder.coders.iter().enumerate() {
                let (_, out_start) = offsets[coder_idx];
                for o in 0..coder.num_out_streams as usize {
                    owners[out_start + o] = coder_idx;
                }
            }
            owners
        };

        let num_coders = folder.coders.len();
        let mut pending_deps = vec![0usize; num_coders];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); num_coders];

        for (coder_idx, coder) in folder.coders.iter().enumerate() {
            let (in_start, _) = offsets[coder_idx];
            for i in 0..coder.num_in_streams as usize {
                if let InputSource::Bound(out_idx) = input_sources[in_start + i] {
                    let producer = owner_of_output[out_idx];
                    pending_deps[coder_idx] += 1;
                    dependents[producer].push(coder_idx);
                }
            }
        }

        let mut ready: Vec<usize> = (0..num_coders).filter(|&c| pending_deps[c] == 0).collect();
        let mut order = Vec::with_capacity(num_coders);

        while let Some(coder_idx) = ready.pop() {
            order.push(coder_idx);
            for &dep in &dependents[coder_idx] {
                pending_deps[dep] -= 1;
                if pending_deps[dep] == 0 {
                    ready.push(dep);
                }
            }
        }

        if order.len() != num_coders {
            return Err(Error::InvalidFormat("folder coder graph has a cycle".into()));
        }

        Ok(Self {
            order,
            input_sources,
            offsets,
            final_out,
        })
    }

    /// Runs the plan over the folder's pack streams.
    ///
    /// Returns the folder's final output bytes. The output of every
    /// coder is checked against its declared size: longer outputs are
    /// trimmed (the AES coder emits whole blocks), shorter ones are
    /// malformed.
    pub fn execute(
        &self,
        folder: &Folder,
        registry: &CoderRegistry,
        pack_streams: &[&[u8]],
    ) -> Result<Vec<u8>> {
        if pack_streams.len() != folder.packed_streams.len() {
            return Err(Error::InvalidFormat(format!(
                "folder consumes {} pack streams, got {}",
                folder.packed_streams.len(),
                pack_streams.len()
            )));
        }

        let total_out = folder.total_out_streams() as usize;
        let mut outputs: Vec<Option<Vec<u8>>> = vec![None; total_out];

        for &coder_idx in &self.order {
            let coder = &folder.coders[coder_idx];
            let (in_start, out_start) = self.offsets[coder_idx];

            let codec = registry.get(&coder.id).ok_or(Error::UnsupportedCoder {
                id: coder.id_u64(),
            })?;

            let (expect_in, expect_out) = codec.num_streams();
            if coder.num_in_streams as usize != expect_in
                || coder.num_out_streams as usize != expect_out
            {
                return Err(Error::InvalidFormat(format!(
                    "{} coder declares {}/{} streams, codec expects {}/{}",
                    crate::codec::method::name(&coder.id),
                    coder.num_in_streams,
                    coder.num_out_streams,
                    expect_in,
                    expect_out
                )));
            }

            let num_out = coder.num_out_streams as usize;
            let out_sizes = &folder.unpack_sizes[out_start..out_start + num_out];
            let properties = coder.properties.as_deref().unwrap_or(&[]);

            let mut produced = {
                let inputs: Vec<&[u8]> = (0..coder.num_in_streams as usize)
                    .map(|i| match self.input_sources[in_start + i] {
                        InputSource::Packed(k) => pack_streams[k],
                        InputSource::Bound(out_idx) => outputs[out_idx]
                            .as_deref()
                            .expect("topological order guarantees producers ran first"),
                    })
                    .collect();
                codec.decode(properties, &inputs, out_sizes)?
            };

            if produced.len() != num_out {
                return Err(Error::InvalidFormat(format!(
                    "{} coder produced {} outputs, declared {}",
                    crate::codec::method::name(&coder.id),
                    produced.len(),
                    num_out
                )));
            }

            for (o, out) in produced.drain(..).enumerate() {
                let declared = out_sizes[o] as usize;
                let mut out = out;
                if out.len() < declared {
                    return Err(Error::InvalidFormat(format!(
                        "{} coder output {} is {} bytes, declared {}",
                        crate::codec::method::name(&coder.id),
                        o,
                        out.len(),
                        declared
                    )));
                }
                out.truncate(declared);
                outputs[out_start + o] = Some(out);
            }
        }

        Ok(outputs[self.final_out]
            .take()
            .expect("final output produced by some coder"))
    }
}

/// Decodes a folder's output from its pack streams.
///
/// This is the shared routine behind both encoded-header decoding and
/// per-file extraction: it knows nothing about files, only the coder
/// graph. The declared output size is bounded by `limits` before any
/// codec runs.
pub(crate) fn decode_folder(
    folder: &Folder,
    registry: &CoderRegistry,
    pack_streams: &[&[u8]],
    limits: &ResourceLimits,
) -> Result<Vec<u8>> {
    let declared = folder
        .final_unpack_size()
        .ok_or_else(|| Error::InvalidFormat("folder missing output size".into()))?;

    if declared > limits.max_folder_unpacked {
        return Err(Error::ResourceLimitExceeded(format!(
            "folder output size {} exceeds limit {}",
            declared, limits.max_folder_unpacked
        )));
    }

    let plan = FolderPlan::build(folder)?;
    let output = plan.execute(folder, registry, pack_streams)?;

    if output.len() as u64 != declared {
        return Err(Error::InvalidFormat(format!(
            "folder produced {} bytes, declared {}",
            output.len(),
            declared
        )));
    }

    Ok(output)
}

/// Slices `count` consecutive pack streams out of the archive's pack
/// region, starting at pack-stream ordinal `first`.
///
/// The pack region begins right after the 32-byte signature header;
/// stream `k` starts at `32 + pack_pos + sum(pack_sizes[..k])`.
pub(crate) fn slice_pack_streams<'a>(
    archive: &'a [u8],
    pack_pos: u64,
    pack_sizes: &[u64],
    first: usize,
    count: usize,
) -> Result<Vec<&'a [u8]>> {
    if first + count > pack_sizes.len() {
        return Err(Error::InvalidFormat(format!(
            "folder needs pack streams {}..{} but only {} are declared",
            first,
            first + count,
            pack_sizes.len()
        )));
    }

    let mut offset = crate::format::SIGNATURE_HEADER_SIZE
        .checked_add(pack_pos)
        .ok_or(Error::Truncated)?;
    for &size in &pack_sizes[..first] {
        offset = offset.checked_add(size).ok_or(Error::Truncated)?;
    }

    let mut streams = Vec::with_capacity(count);
    for &size in &pack_sizes[first..first + count] {
        let end = offset.checked_add(size).ok_or(Error::Truncated)?;
        if end > archive.len() as u64 {
            return Err(Error::Truncated);
        }
        streams.push(&archive[offset as usize..end as usize]);
        offset = end;
    }

    Ok(streams)
}
