//! Library and compiler-flag checks.

use anyhow::Result;

use super::action::{perform, ChkLib, LdProbe, ShellProbe};
use super::document::ConfigDocument;
use crate::console::Console;
use crate::platform::Tuple;

const DLFCN_TEST: &str = r#"
#include <dlfcn.h>
#include <stdio.h>

void fnord() { int i=42;}
int main ()
{
  void *self = dlopen (0, RTLD_GLOBAL|RTLD_NOW);
  int status = 1;

  if (self)
    {
      if (dlsym (self,"fnord"))       status = 0;
      else if (dlsym( self,"_fnord")) status = 0;
      /* dlclose (self); */
    }
  else
    puts (dlerror ());

  return status;
}
"#;

const PTHREAD_TEST: &str = r#"
#include <stdio.h>
#include <pthread.h>
int main ()
{
  pthread_t thread;
  pthread_create (&thread, NULL, NULL, NULL);
  return 0;
}
"#;

const BZ2_TEST: &str = r#"
#include <stdio.h>
#include <bzlib.h>
int main ()
{
  BZ2_bzReadOpen(NULL, NULL, 0, 0, NULL, 0);
  return 0;
}
"#;

const LIBZ_TEST: &str = r#"
#include <stdio.h>
#include <zlib.h>
int main ()
{
  compress(NULL, NULL, NULL, 0);
  return 0;
}
"#;

const XZ_TEST: &str = r#"
#include <stdio.h>
#include <lzma.h>
int main ()
{
  lzma_stream_decoder(NULL, 0, 0);
  return 0;
}
"#;

const ICONV_TEST: &str = r#"
#include <stdio.h>
#include <iconv.h>
int main ()
{
  iconv_open(NULL, NULL);
  return 0;
}
"#;

const REGEX_TEST: &str = r#"
#include <stdio.h>
#include <regex.h>

int match(regex_t *x, char *s)
{
    regmatch_t matches[1];
    return regexec(x, s, 1, matches, 0);
}

int main()
{
    int     rv;
    regex_t exp;

    rv = regcomp(&exp, "^[0-9]+$", REG_EXTENDED);
    if (rv != 0) {
        return 1;
    }

    if (match(&exp, "7") != 0)
    {
        return 1;
    }
    if (match(&exp, "foo") == 0)
    {
        return 1;
    }

    regfree(&exp);
    return 0;
}
"#;

const STRTOK_R_TEST: &str = r#"
#include <string.h>

int main ()
{
  char *saveptr;
  strtok_r("String tok string", "tok", &saveptr);
  return 0;
}
"#;

const NUMA_TEST: &str = r#"
#include <numa.h>

int main()
{
struct bitmask *bm = numa_allocate_cpumask();
return 0;
}
"#;

const STRERROR_R_TEST: &str = r#"
#include <string.h>

int main()
{
    /* some implementations fail if buf is less than 80 characters
       so size it appropriately */
    char errstr[128];
    /* some implementations fail if err == 0 */
    strerror_r(1, errstr, 127);
    return 0;
}
"#;

/// Static-link results on MinGW hosts; `true` means the probe passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MingwChecks {
    pub dlfcn: bool,
    pub pthread: bool,
    pub bz2: bool,
    pub libz: bool,
    pub xz: bool,
    pub iconv: bool,
    pub regex: bool,
    pub strtok_r: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResults {
    pub host_system: String,
    pub mingw: Option<MingwChecks>,
    pub strerror_r: bool,
    /// Extra `-W` flags the compiler accepts, without the `-W`.
    pub gcc_w_extra: Vec<String>,
}

impl CheckResults {
    pub fn doc_add(&self, doc: &mut ConfigDocument) {
        doc.add_blank();
        if let Some(m) = &self.mingw {
            if m.dlfcn {
                doc.add("HAS.dlfcn", 1);
            } else if m.pthread {
                doc.add("HAS.pthread", 1);
            }
            for (found, name) in [
                (m.bz2, "HAS.bz2"),
                (m.libz, "HAS.libz"),
                (m.xz, "HAS.xz"),
                (m.iconv, "HAS.iconv"),
                (m.regex, "HAS.regex"),
            ] {
                if found {
                    doc.add(name, 1);
                }
            }
            if !m.strtok_r {
                doc.add("COMPAT.strtok_r", 1);
            }
        } else {
            if self.host_system == "freebsd" {
                doc.add("HAS.pthread", 1);
            }
            if self.strerror_r {
                doc.add("HAS.strerror_r", 1);
            }
        }
    }
}

fn static_link(pretext: &str, gcc: &str, lib: &str, source: &str, console: &mut Console) -> Result<bool> {
    let mut probe = LdProbe::new(pretext, format!("{gcc} -static"), lib, source);
    Ok(!perform(&mut probe, console)?.fail)
}

/// Run the host library checks with compiler `gcc`.
pub fn run_checks(
    host: &Tuple,
    gcc: &str,
    pkgconfig: Option<&str>,
    numa: bool,
    console: &mut Console,
) -> Result<CheckResults> {
    let mut results = CheckResults {
        host_system: host.system.clone(),
        ..CheckResults::default()
    };

    if host.system == "mingw" {
        results.mingw = Some(MingwChecks {
            dlfcn: static_link("static dlfcn", gcc, "-ldl", DLFCN_TEST, console)?,
            pthread: static_link("static pthread", gcc, "-lpthread", PTHREAD_TEST, console)?,
            bz2: static_link("static bz2", gcc, "-lbz2", BZ2_TEST, console)?,
            libz: static_link("static zlib", gcc, "-lz", LIBZ_TEST, console)?,
            xz: static_link("static xz", gcc, "-llzma", XZ_TEST, console)?,
            iconv: static_link("static iconv", gcc, "-liconv", ICONV_TEST, console)?,
            regex: static_link("static regex", gcc, "-lregex", REGEX_TEST, console)?,
            strtok_r: static_link("static strtok_r", gcc, "", STRTOK_R_TEST, console)?,
        });
    }

    if host.system == "linux" && numa {
        let mut probe = ChkLib {
            pretext: "numa".to_string(),
            command: gcc.to_string(),
            lib: "numa".to_string(),
            test_source: NUMA_TEST.to_string(),
            pkgconfig: pkgconfig.map(str::to_string),
            abort: true,
        };
        perform(&mut probe, console)?;
    }

    let mut strerror_r = LdProbe::new("strerror_r", gcc, "", STRERROR_R_TEST);
    results.strerror_r = !perform(&mut strerror_r, console)?.fail;

    let mut truncation = ShellProbe::new(
        "checking for -Wno-format-truncation",
        format!(
            "{gcc} -O2 -Werror -Wno-format-truncation -S -o /dev/null -xc /dev/null > /dev/null 2>&1"
        ),
    );
    if !perform(&mut truncation, console)?.fail {
        results.gcc_w_extra.push("no-format-truncation".to_string());
    }
    Ok(results)
}
