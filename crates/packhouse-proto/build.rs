fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().compile_protos(
        &[
            "src/proto/defs/scheduler.proto",
            "src/proto/defs/principals.proto",
        ],
        &["src/proto/defs"],
    )?;
    Ok(())
}
