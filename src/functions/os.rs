use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use globset::Glob;

use super::{Args, Builtin, FunctionContext, Output};
use crate::error::{Error, Result};

pub(super) fn call(builtin: Builtin, args: &Args, ctx: &mut dyn FunctionContext) -> Result<Output> {
    let output = match builtin {
        Builtin::OsBasename => {
            let path = args.text(0, ctx)?;
            let name = Path::new(&path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Output::Text(name)
        }
        Builtin::OsDirname => {
            let path = args.text(0, ctx)?;
            let parent = Path::new(&path)
                .parent()
                .map(|parent| parent.display().to_string())
                .filter(|parent| !parent.is_empty())
                .unwrap_or_else(|| ".".to_string());
            Output::Text(parent)
        }
        Builtin::OsChangeExtension => {
            let path = args.text(0, ctx)?;
            let extension = args.text(1, ctx)?;
            let changed = Path::new(&path).with_extension(extension.trim_start_matches('.'));
            Output::Text(changed.display().to_string())
        }
        Builtin::OsPwd => Output::Text(current_dir()?.display().to_string()),
        Builtin::OsTempname => {
            let prefix = args.optional_text(0, ctx)?.unwrap_or_else(|| "ses".to_string());
            let path = tempfile::Builder::new()
                .prefix(&prefix)
                .tempfile()
                .map_err(|e| Error::io("temporary file", e))?
                .into_temp_path()
                .keep()
                .map_err(|e| Error::io("temporary file", e.error))?;
            Output::Text(path.display().to_string())
        }
        Builtin::OsCd => {
            let dir = match args.optional_text(0, ctx)? {
                Some(dir) => PathBuf::from(dir),
                None => dirs::home_dir()
                    .ok_or_else(|| Error::runtime("os.cd: no home directory"))?,
            };
            Output::flag(change_dir(&dir))
        }
        Builtin::OsPushd => {
            let dir = PathBuf::from(args.text(0, ctx)?);
            let previous = current_dir()?;
            let ok = change_dir(&dir);
            if ok {
                ctx.dir_stack().push(previous);
            }
            Output::flag(ok)
        }
        Builtin::OsPopd => match ctx.dir_stack().pop() {
            Some(dir) => Output::flag(change_dir(&dir)),
            None => {
                log::debug!("os.popd: directory stack is empty");
                Output::flag(false)
            }
        },
        Builtin::OsCopy => {
            let source = PathBuf::from(args.text(0, ctx)?);
            let mut target = PathBuf::from(args.text(1, ctx)?);
            if target.is_dir() {
                if let Some(name) = source.file_name() {
                    target.push(name);
                }
            }
            Output::flag(report(
                "os.copy",
                fs::copy(&source, &target).map(|_| ()),
            ))
        }
        Builtin::OsExists => Output::flag(Path::new(&args.text(0, ctx)?).exists()),
        Builtin::OsIsDir => Output::flag(Path::new(&args.text(0, ctx)?).is_dir()),
        Builtin::OsMkdir => {
            Output::flag(report("os.mkdir", fs::create_dir_all(args.text(0, ctx)?)))
        }
        Builtin::OsListFiles => {
            let dir = PathBuf::from(args.text(1, ctx)?);
            let matcher = match args.optional_text(2, ctx)? {
                Some(glob) => Some(
                    Glob::new(&glob)
                        .map_err(|e| Error::runtime(format!("os.listfiles: {}", e)))?
                        .compile_matcher(),
                ),
                None => None,
            };
            let entries = fs::read_dir(&dir).map_err(|e| Error::io(dir.display(), e))?;
            let mut paths = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| Error::io(dir.display(), e))?;
                let name = entry.file_name();
                if matcher.as_ref().is_none_or(|m| m.is_match(&name)) {
                    paths.push(entry.path().display().to_string());
                }
            }
            paths.sort();
            let count = paths.len();
            ctx.buffer(args.buffer(0)?).set_lines(paths);
            Output::count(count)
        }
        other => return Err(Error::internal(format!("{:?} is not an os function", other))),
    };
    Ok(output)
}

fn current_dir() -> Result<PathBuf> {
    env::current_dir().map_err(|e| Error::io("current directory", e))
}

fn change_dir(dir: &Path) -> bool {
    report("os.cd", env::set_current_dir(dir))
}

/// Failures of flag-returning functions are reported as `0`, not raised.
fn report(what: &str, result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::debug!("{}: {}", what, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use super::super::testing::*;
    use super::super::{FunctionContext, FunctionEngine};
    use crate::ast::Arg;

    fn string(name: &str, args: Vec<Arg>) -> String {
        let mut ctx = TestContext::default();
        FunctionEngine::as_string(&call(name, args), &mut ctx).unwrap()
    }

    #[test]
    fn path_pieces() {
        assert_eq!(string("os.basename", vec![text("/a/b/c.txt")]), "c.txt");
        assert_eq!(string("os.dirname", vec![text("/a/b/c.txt")]), "/a/b");
        assert_eq!(string("os.dirname", vec![text("c.txt")]), ".");
        assert_eq!(
            string("os.changeextension", vec![text("/a/c.txt"), text(".md")]),
            "/a/c.md"
        );
    }

    #[test]
    fn filesystem_predicates_and_mkdir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x/y");
        let nested = nested.to_str().unwrap();
        let mut ctx = TestContext::default();
        let exists = call("os.exists", vec![text(nested)]);
        assert_eq!(FunctionEngine::as_numeric(&exists, &mut ctx).unwrap(), 0.0);
        let mkdir = call("os.mkdir", vec![text(nested)]);
        assert_eq!(FunctionEngine::as_numeric(&mkdir, &mut ctx).unwrap(), 1.0);
        assert_eq!(FunctionEngine::as_numeric(&exists, &mut ctx).unwrap(), 1.0);
        let isdir = call("os.isdir", vec![text(nested)]);
        assert_eq!(FunctionEngine::as_numeric(&isdir, &mut ctx).unwrap(), 1.0);
    }

    #[test]
    fn copy_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "data").unwrap();
        let target = dir.path().join("sub");
        fs::create_dir(&target).unwrap();
        let mut ctx = TestContext::default();
        let c = call(
            "os.copy",
            vec![text(source.to_str().unwrap()), text(target.to_str().unwrap())],
        );
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 1.0);
        assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "data");

        let missing = call("os.copy", vec![text("/no/such/file"), text(target.to_str().unwrap())]);
        assert_eq!(FunctionEngine::as_numeric(&missing, &mut ctx).unwrap(), 0.0);
    }

    #[test]
    fn listfiles_filters_with_glob() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.ses", "a.ses", "c.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let mut ctx = TestContext::default();
        let c = call(
            "os.listfiles",
            vec![buf("out"), text(dir.path().to_str().unwrap()), text("*.ses")],
        );
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 2.0);
        let lines = ctx.buffer("out").lines().to_vec();
        assert!(lines[0].ends_with("a.ses"));
        assert!(lines[1].ends_with("b.ses"));
    }

    #[test]
    fn tempname_creates_a_file() {
        let name = string("os.tempname", vec![text("sestest")]);
        let path = std::path::Path::new(&name);
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("sestest"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn popd_on_empty_stack_fails() {
        let mut ctx = TestContext::default();
        let c = call("os.popd", vec![]);
        assert_eq!(FunctionEngine::as_numeric(&c, &mut ctx).unwrap(), 0.0);
        assert!(env::current_dir().is_ok());
    }
}
