use anyhow::{anyhow, Context};
use std::env;

fn main() -> anyhow::Result<()> {
    // Already building for the eBPF target: nothing to do, and recursing would loop
    if env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default() == "bpf" {
        return Ok(());
    }

    if env::consts::OS != "linux" {
        println!(
            "cargo:warning=eBPF compilation skipped on {}. Build the probes on Linux.",
            env::consts::OS
        );
        return Ok(());
    }

    let cargo_metadata::Metadata { packages, .. } =
        aya_build::cargo_metadata::MetadataCommand::new()
            .no_deps()
            .exec()
            .context("MetadataCommand::exec")?;

    let ebpf_package = packages
        .into_iter()
        .find(|pkg| pkg.name == "nstrace-probes")
        .ok_or_else(|| anyhow!("nstrace-probes package not found"))?;

    aya_build::build_ebpf([ebpf_package])
}
