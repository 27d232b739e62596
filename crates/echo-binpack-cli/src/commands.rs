// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Subcommand bodies.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use echo_binpack::header::read_header;
use echo_binpack::{
    binary_to_object, collect_reoccurring_structures, object_to_binary, plan_instance,
    NodeId, ObjectGraph, Reader, SchemaBundle, SchemaDocument,
};
use tracing::info;

use crate::{Command, WireArgs};

pub fn run(command: Command) -> Result<()> {
    match command {
        Command::Encode {
            wire,
            input,
            output,
        } => encode(&wire, input.as_deref(), output.as_deref()),
        Command::Decode {
            wire,
            input,
            output,
            pretty,
        } => decode(&wire, input.as_deref(), output.as_deref(), pretty),
        Command::Verify { wire, input } => verify(&wire, input.as_deref()),
        Command::Inspect { wire, input } => inspect(&wire, input.as_deref()),
        Command::Schema { schema } => describe_schema(&schema),
    }
}

fn encode(wire: &WireArgs, input: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let bundle = load_bundle(wire)?;
    let (graph, root) = read_json_graph(input)?;
    let bytes = object_to_binary(&graph, root, &bundle.composer())?;
    info!(nodes = graph.len(), bytes = bytes.len(), "encoded");
    write_output(output, &bytes)
}

fn verify(wire: &WireArgs, input: Option<&Path>) -> Result<()> {
    let bundle = load_bundle(wire)?;
    let opts = bundle.composer();
    let (graph, root) = read_json_graph(input)?;
    let bytes = object_to_binary(&graph, root, &opts)?;
    let (decoded, decoded_root) = binary_to_object(&bytes, &opts)?;
    if !graph.structurally_eq(root, &decoded, decoded_root) {
        bail!("decoded graph differs from the input (fields outside the schema are dropped on encode)");
    }
    let mut out = io::stdout().lock();
    writeln!(out, "ok: {} nodes, {} bytes", decoded.len(), bytes.len())?;
    Ok(())
}

fn decode(wire: &WireArgs, input: Option<&Path>, output: Option<&Path>, pretty: bool) -> Result<()> {
    let bundle = load_bundle(wire)?;
    let bytes = read_input(input)?;
    let (graph, root) = binary_to_object(&bytes, &bundle.composer())?;
    info!(nodes = graph.len(), bytes = bytes.len(), "decoded");
    let json = graph
        .to_json(root)
        .context("decoded graph has no JSON form (it contains a cycle)")?;
    let mut text = if pretty {
        serde_json::to_vec_pretty(&json)?
    } else {
        serde_json::to_vec(&json)?
    };
    text.push(b'\n');
    write_output(output, &text)
}

fn inspect(wire: &WireArgs, input: Option<&Path>) -> Result<()> {
    let bundle = load_bundle(wire)?;
    let opts = bundle.composer();
    let bytes = read_input(input)?;

    let mut out = io::stdout().lock();
    writeln!(out, "bytes:   {}", bytes.len())?;
    let widths = if opts.options.use_header_byte {
        let mut reader = Reader::new(&bytes, opts.options.little_endian);
        let widths = read_header(&mut reader).context("unreadable header")?;
        writeln!(out, "header:  {} byte(s)", reader.offset())?;
        widths
    } else {
        writeln!(out, "header:  none")?;
        opts.options.widths
    };
    writeln!(
        out,
        "widths:  refId={} array={} string={} buffer={}",
        widths.ref_id, widths.array_length, widths.string_length, widths.array_buffer_length
    )?;

    let (graph, _) = binary_to_object(&bytes, &opts)?;
    writeln!(out, "nodes:   {}", graph.len())?;
    Ok(())
}

fn describe_schema(path: &Path) -> Result<()> {
    let bundle = load_schema(path)?;
    let reference_structures = collect_reoccurring_structures(&bundle.schema, &bundle.name_ids);
    let root_plan = plan_instance(&bundle.schema, &bundle.name_ids, bundle.schema.root())?;

    let mut out = io::stdout().lock();
    writeln!(
        out,
        "fingerprint: {}",
        hex::encode(bundle.schema.fingerprint(&bundle.name_ids))
    )?;
    writeln!(out, "structures:  {}", bundle.schema.len())?;
    writeln!(out, "by reference: {}", reference_structures.len())?;
    writeln!(out, "names:       {}", bundle.name_ids.len())?;
    writeln!(out, "root reads:  {}", root_plan.len())?;
    Ok(())
}

fn load_schema(path: &Path) -> Result<SchemaBundle> {
    let text =
        fs::read(path).with_context(|| format!("failed to read schema {}", path.display()))?;
    SchemaDocument::from_json_slice(&text)
        .and_then(|doc| doc.compile())
        .with_context(|| format!("invalid schema document {}", path.display()))
}

fn load_bundle(wire: &WireArgs) -> Result<SchemaBundle> {
    let mut bundle = load_schema(&wire.schema)?;
    if wire.big_endian {
        bundle.options.little_endian = false;
    }
    if wire.no_header {
        bundle.options.use_header_byte = false;
    }
    Ok(bundle)
}

fn read_json_graph(input: Option<&Path>) -> Result<(ObjectGraph, NodeId)> {
    let json: serde_json::Value =
        serde_json::from_slice(&read_input(input)?).context("input is not valid JSON")?;
    let (graph, root) = ObjectGraph::from_json(&json)?;
    let Some(root) = root.as_node() else {
        bail!("input must be a JSON object or array, found {}", root.kind_name());
    };
    Ok((graph, root))
}

/// `None` for stdin/stdout (`-` or no path).
fn file_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| *p != Path::new("-"))
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match file_path(path) {
        Some(path) => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match file_path(path) {
        Some(path) => {
            fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            let mut out = io::stdout().lock();
            out.write_all(bytes).context("failed to write stdout")?;
            out.flush().context("failed to write stdout")
        }
    }
}
