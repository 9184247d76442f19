use vergen::EmitBuilder;

fn main() {
    print_build_directives();
    generate_build_info();
}

// -----------------------------------------------------------------------------
// Directives
// -----------------------------------------------------------------------------
fn print_build_directives() {
    // any code change
    println!("cargo:rerun-if-changed=src/");
    // env files embedded in deployment images
    println!("cargo:rerun-if-changed=config/");
}

// -----------------------------------------------------------------------------
// Code generation: Build Info
// -----------------------------------------------------------------------------
fn generate_build_info() {
    if let Err(e) = EmitBuilder::builder()
        .build_timestamp()
        .git_branch()
        .git_describe(false, true, None)
        .git_sha(true)
        .git_commit_timestamp()
        .git_commit_message()
        .git_commit_author_name()
        .cargo_debug()
        .cargo_features()
        .rustc_semver()
        .rustc_channel()
        .rustc_host_triple()
        .emit()
    {
        panic!("failed to emit build information | reason={e:?}");
    };
}
