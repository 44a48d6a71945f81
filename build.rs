use vergen_gitcl::{Emitter, Gitcl};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only the short SHA and dirty flag end up in `version_string()`.
    let gitcl = Gitcl::builder().sha(true).dirty(true).build();

    Emitter::default().add_instructions(&gitcl)?.emit()?;

    Ok(())
}
