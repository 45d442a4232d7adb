//! README files written into fresh vaults.

use std::fs;
use std::path::Path;

use crate::error::{VaultError, VaultResult};

/// Filename of the note left next to the encrypted files.
const STORAGE_README_FILENAME: &str = "IMPORTANT.readme.txt";

/// Filename of the note explaining how to access the vault.
const ACCESS_README_FILENAME: &str = "HOW-TO-ACCESS.readme.txt";

const STORAGE_README: &str = "\
This directory contains an encrypted vault.\r\n\
\r\n\
Do not rename, move, modify or delete any file in this directory, or the\r\n\
vault may become permanently inaccessible. The encrypted files are only\r\n\
usable through the application that created this vault.\r\n";

const ACCESS_README: &str = "\
To access the contents of this vault, open it with the application that\r\n\
created it and enter your passphrase. The decrypted files never touch this\r\n\
directory; they are provided through a virtual drive while the vault is\r\n\
unlocked.\r\n";

/// Writes both README files into a freshly initialized vault directory.
pub(crate) fn write_vault_readmes(vault_dir: &Path) -> VaultResult<()> {
    for (name, content) in [
        (STORAGE_README_FILENAME, STORAGE_README),
        (ACCESS_README_FILENAME, ACCESS_README),
    ] {
        let path = vault_dir.join(name);
        fs::write(&path, content)
            .map_err(|e| VaultError::io(format!("writing '{}'", path.display()), e))?;
    }
    Ok(())
}
