//! Builds the three-line `#VERB` / shell-equivalent / marker-echo commands
//! for every operation the engine can ask of the remote shell.

use session::OpenMode;
use xfer_path::Path;

use crate::expectation::ExpectKind;
use crate::quote::shell_encode;

/// A command ready to be written to the shell's stdin, plus the
/// expectation(s) it provokes, in the order replies will arrive.
pub struct Command {
    pub text: String,
    pub expects: Vec<ExpectKind>,
}

impl Command {
    fn single(text: impl Into<String>, expect: ExpectKind) -> Self {
        Self { text: text.into(), expects: vec![expect] }
    }
}

/// The three greeting commands sent right after the shell connects:
/// a marker sanity-check, a version handshake, and (if the home
/// directory isn't already known) a `pwd`.
pub fn greeting(need_pwd: bool) -> Vec<Command> {
    let mut commands = vec![
        Command::single(
            "#FISH\necho;start_fish_server;TZ=GMT;export TZ;LC_ALL=C;export LC_ALL;echo '### 200'\n",
            ExpectKind::Greeting,
        ),
        Command::single("#VER 0.0.2\necho '### 000'\n", ExpectKind::Version),
    ];
    if need_pwd {
        commands.push(Command::single("#PWD\npwd; echo '### 200'\n", ExpectKind::Pwd));
    }
    commands
}

pub fn chdir(path: &Path) -> Command {
    let e = shell_encode(&path.to_string());
    Command::single(format!("#CWD {e}\ncd {e}; echo '### 000'\n"), ExpectKind::Cwd)
}

pub fn list(path: &Path, long: bool) -> Command {
    let e = shell_encode(&path.to_string());
    let flags = if long { "-l" } else { "" };
    Command::single(format!("#LIST {e}\nls {flags} {e}; echo '### 200'\n"), ExpectKind::Dir)
}

pub fn retrieve(path: &Path) -> Command {
    let e = shell_encode(&path.to_string());
    Command {
        text: format!("#RETR {e}\nls -lLd {e}; echo '### 100'; cat {e}; echo '### 200'\n"),
        expects: vec![ExpectKind::RetrInfo, ExpectKind::Retr],
    }
}

pub fn store(path: &Path, size: u64) -> Command {
    let e = shell_encode(&path.to_string());
    Command {
        text: format!(
            "#STOR {size} {e}\n>{e};echo '### 001';dd ibs=1 count={size} 2>/dev/null|(cat>{e};cat>/dev/null);echo '### 200'\n"
        ),
        expects: vec![ExpectKind::StorPreliminary, ExpectKind::Stor],
    }
}

pub fn remove(path: &Path) -> Command {
    let e = shell_encode(&path.to_string());
    Command::single(format!("#DELE {e}\nrm -f {e}; echo '### 000'\n"), ExpectKind::Default)
}

pub fn remove_dir(path: &Path) -> Command {
    let e = shell_encode(&path.to_string());
    Command::single(format!("#RMD {e}\nrmdir {e}; echo '### 000'\n"), ExpectKind::Default)
}

pub fn make_dir(path: &Path) -> Command {
    let e = shell_encode(&path.to_string());
    Command::single(format!("#MKD {e}\nmkdir {e}; echo '### 000'\n"), ExpectKind::Default)
}

pub fn rename(from: &Path, to: &Path) -> Command {
    let e = shell_encode(&from.to_string());
    let e1 = shell_encode(&to.to_string());
    Command::single(format!("#RENAME {e} {e1}\nmv {e} {e1}; echo '### 000'\n"), ExpectKind::Default)
}

pub fn chmod(path: &Path, mode: u32) -> Command {
    let e = shell_encode(&path.to_string());
    Command::single(format!("#CHMOD {mode:04o} {e}\nchmod {mode:04o} {e}; echo '### 000'\n"), ExpectKind::Default)
}

pub fn quote(raw: &str) -> Command {
    Command::single(format!("#EXEC {raw}\n{raw}; echo '### 200'\n"), ExpectKind::Quote)
}

/// Whether `mode` has an implementation at all; `ArrayInfo` (lftp's
/// batched stat prefetch) has no counterpart in the single-path
/// [`session::Session`] surface this engine implements.
#[must_use]
pub fn is_supported(mode: OpenMode) -> bool {
    !matches!(mode, OpenMode::ArrayInfo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_command_quotes_the_path_and_queues_two_expectations() {
        let cmd = retrieve(&Path::parse("/pub/a file.bin"));
        assert!(cmd.text.contains(r"/pub/a\ file.bin"));
        assert_eq!(cmd.expects, vec![ExpectKind::RetrInfo, ExpectKind::Retr]);
    }

    #[test]
    fn store_command_embeds_the_declared_size() {
        let cmd = store(&Path::parse("/pub/out.bin"), 4096);
        assert!(cmd.text.contains("count=4096"));
    }

    #[test]
    fn array_info_is_unsupported() {
        assert!(!is_supported(OpenMode::ArrayInfo));
        assert!(is_supported(OpenMode::Retrieve));
    }
}
